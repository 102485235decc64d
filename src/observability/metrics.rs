//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `service_broker_reconciliations_total` - Reconciliations by resource kind
//! - `service_broker_reconciliation_errors_total` - Transient reconciliation errors by resource kind
//! - `service_broker_reconciliation_duration_seconds` - Duration of reconciliation invocations
//! - `service_broker_broker_requests_total` - Broker API calls by operation and outcome
//! - `service_broker_broker_request_duration_seconds` - Duration of broker API calls
//! - `service_broker_requeues_total` - Requeue directives by reason
//! - `service_broker_operations_in_flight` - Asynchronous broker operations currently tracked
//! - `service_broker_credential_secrets_written_total` - Binding credential secrets created or replaced

use anyhow::Result;
use prometheus::{Histogram, HistogramVec, IntCounterVec, IntCounter, IntGauge, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "service_broker_reconciliations_total",
            "Total number of reconciliations by resource kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "service_broker_reconciliation_errors_total",
            "Total number of transient reconciliation errors by resource kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "service_broker_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static BROKER_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "service_broker_broker_requests_total",
            "Total number of broker API requests by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create BROKER_REQUESTS_TOTAL metric - this should never happen")
});

static BROKER_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "service_broker_broker_request_duration_seconds",
            "Duration of broker API requests in seconds by operation",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["operation"],
    )
    .expect("Failed to create BROKER_REQUEST_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "service_broker_requeues_total",
            "Total number of requeue directives by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static OPERATIONS_IN_FLIGHT: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "service_broker_operations_in_flight",
        "Number of asynchronous broker operations started and not yet observed as terminal",
    )
    .expect("Failed to create OPERATIONS_IN_FLIGHT metric - this should never happen")
});

static CREDENTIAL_SECRETS_WRITTEN_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "service_broker_credential_secrets_written_total",
        "Total number of binding credential secrets created or replaced",
    )
    .expect("Failed to create CREDENTIAL_SECRETS_WRITTEN_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(BROKER_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BROKER_REQUEST_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(OPERATIONS_IN_FLIGHT.clone()))?;
    REGISTRY.register(Box::new(CREDENTIAL_SECRETS_WRITTEN_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

/// Record one broker API call
///
/// `outcome` is one of `sync`, `accepted`, `in_progress`, `succeeded`, `failed`,
/// `transient`, `permanent`, `not_found`, `conflict`.
pub fn record_broker_request(operation: &str, outcome: &str, duration: f64) {
    BROKER_REQUESTS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
    BROKER_REQUEST_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_operations_in_flight() {
    OPERATIONS_IN_FLIGHT.inc();
}

pub fn decrement_operations_in_flight() {
    // Operations started before a restart are not counted, so never go below zero
    if OPERATIONS_IN_FLIGHT.get() > 0 {
        OPERATIONS_IN_FLIGHT.dec();
    }
}

pub fn increment_credential_secrets_written() {
    CREDENTIAL_SECRETS_WRITTEN_TOTAL.inc();
}
