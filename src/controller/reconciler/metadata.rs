//! # Metadata Helpers
//!
//! Finalizer and retry-annotation handling on `ObjectMeta`.

use crate::constants::{FINALIZER, RETRY_ANNOTATION};
use kube::api::ObjectMeta;

pub fn has_finalizer(meta: &ObjectMeta) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|name| name == FINALIZER))
}

/// Add the finalizer; returns false when already present
pub fn add_finalizer(meta: &mut ObjectMeta) -> bool {
    if has_finalizer(meta) {
        return false;
    }
    meta.finalizers
        .get_or_insert_with(Vec::new)
        .push(FINALIZER.to_string());
    true
}

/// Remove the finalizer; returns false when it was not present
pub fn remove_finalizer(meta: &mut ObjectMeta) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|name| name != FINALIZER);
    finalizers.len() != before
}

/// Explicit retry requested via annotation (any value)
pub fn retry_requested(meta: &ObjectMeta) -> bool {
    meta.annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(RETRY_ANNOTATION))
}

/// Remove the retry annotation; returns false when it was not present
pub fn clear_retry_annotation(meta: &mut ObjectMeta) -> bool {
    meta.annotations
        .as_mut()
        .is_some_and(|a| a.remove(RETRY_ANNOTATION).is_some())
}
