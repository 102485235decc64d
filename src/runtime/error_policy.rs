//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loops.
//!
//! Every error reaching this layer is transient (permanent failures are projected
//! onto status by the engine). Backoff is tracked per resource so one failing
//! resource does not slow down the others.

use crate::controller::reconciler::{resource_key, Reconciler, ReconcilerError, ResourceKind};
use crate::observability;
use crate::store::StoreError;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Handle reconciliation errors with exponential backoff
pub fn handle_reconciliation_error<K: ResourceKind>(
    obj: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = K::KIND,
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        error.kind = error.label(),
        error = %error
    );
    let _error_guard = error_span.enter();

    if matches!(error, ReconcilerError::Store(StoreError::Conflict(_))) {
        warn!("Write conflict on {} {}/{}, retrying from fresh state", K::KIND, namespace, name);
    } else {
        error!("Reconciliation error for {} {}/{}: {}", K::KIND, namespace, name, error);
    }
    observability::metrics::increment_reconciliation_errors(K::KIND);

    let (delay, error_count) = ctx.next_backoff(&resource_key(K::KIND, &namespace, &name));

    info!(
        "🔄 Retrying with exponential backoff: {}ms (error count: {}, trigger source: error-backoff)",
        delay.as_millis(),
        error_count
    );
    observability::metrics::increment_requeues("error-backoff");
    Action::requeue(delay)
}

/// Log a watch stream error; the controller keeps running
///
/// Returns `true` for errors that are expected during normal operation
/// (expired resource versions, restarts of the API server storage).
pub fn handle_watch_stream_error(kind: &str, error_string: &str) -> bool {
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired");
    let is_429 = error_string.contains("429") || error_string.contains("TooManyRequests");
    let is_not_found = error_string.contains("ObjectNotFound") || error_string.contains("404");

    if is_410 {
        warn!(error_type = "410", "{} watch resource version expired, watch will restart", kind);
        true
    } else if is_429 {
        warn!(error_type = "429", "{} watch throttled by the API server", kind);
        true
    } else if is_not_found {
        warn!(
            "{} not found (404) - this may be normal if the resource was deleted or the CRD is missing: {}",
            kind, error_string
        );
        true
    } else {
        error!("{} controller stream error: {}", kind, error_string);
        false
    }
}
