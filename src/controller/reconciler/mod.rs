//! # Reconciler
//!
//! Reconciliation of `ServiceInstance` and `ServiceBinding` resources against the broker.
//!
//! The reconciler:
//! - Resolves broker credentials on every invocation (rotation needs no restart)
//! - Creates, updates and deletes broker resources, one step per invocation
//! - Tracks asynchronous broker operations with rate-limited polling
//! - Projects outcomes onto the `Ready` condition and `observedGeneration`
//! - Materializes binding credentials into an owned Secret
//!
//! ## Reconciliation Flow
//!
//! 1. Read the current object from the store
//! 2. Derive the lifecycle phase from spec, metadata and status
//! 3. Ensure the finalizer (before any broker call)
//! 4. Take the step for the phase and project its outcome
//! 5. Return the requeue action; transient errors go to the error policy

pub mod conditions;
pub mod kinds;
pub mod metadata;
pub mod operation;
pub mod phase;
pub mod reconcile;
pub mod secrets;
pub mod types;

pub use kinds::{Completion, Dependency, ResourceKind};
pub use phase::{derive_phase, Phase};
pub use types::{resource_key, BackoffState, Reconciler, ReconcilerError};

use crate::crd::{ServiceBinding, ServiceInstance};
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, Instrument};

/// Reconcile entry point for `ServiceInstance`
pub async fn reconcile_instance(
    instance: Arc<ServiceInstance>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    reconcile(instance.as_ref(), &ctx).await
}

/// Reconcile entry point for `ServiceBinding`
pub async fn reconcile_binding(
    binding: Arc<ServiceBinding>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    reconcile(binding.as_ref(), &ctx).await
}

/// Run one invocation for a delivered object; the object is re-read from the
/// store so the step is computed from current state
pub async fn reconcile<K: ResourceKind>(
    resource: &K,
    ctx: &Reconciler,
) -> Result<Action, ReconcilerError> {
    let name = resource.name_any();
    let namespace = resource.namespace().unwrap_or_default();
    let span = info_span!(
        "reconcile",
        resource.kind = K::KIND,
        resource.name = %name,
        resource.namespace = %namespace
    );

    let start = Instant::now();
    metrics::increment_reconciliations(K::KIND);
    let result = reconcile::run::<K>(ctx, &namespace, &name)
        .instrument(span)
        .await;
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    if result.is_ok() && ctx.reset_backoff(&resource_key(K::KIND, &namespace, &name)) {
        info!(
            "🔄 Backoff reset for {} {}/{} after successful reconciliation",
            K::KIND,
            namespace,
            name
        );
    }
    result
}
