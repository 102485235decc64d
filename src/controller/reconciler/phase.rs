//! # Lifecycle Phase
//!
//! The lifecycle phase is derived from spec, metadata and status on every
//! invocation and never stored.

use crate::controller::reconciler::metadata::has_finalizer;
use crate::crd::{BrokerResource, Reason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Deletion requested and the finalizer is still present
    PendingDelete,
    /// Deletion requested and nothing left to clean up
    Released,
    /// A broker operation is in flight
    OperationInProgress,
    /// The current generation ended in a permanent failure; wait for a spec change or retry
    Halted,
    /// A create conflicted; look the resource up by name
    Recovering,
    /// No external identifier recorded
    NotCreated,
    /// Created and the current generation is processed
    Converged,
    /// Created but the current generation is not processed yet
    OutOfDate,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingDelete => "PendingDelete",
            Self::Released => "Released",
            Self::OperationInProgress => "OperationInProgress",
            Self::Halted => "Halted",
            Self::Recovering => "Recovering",
            Self::NotCreated => "NotCreated",
            Self::Converged => "Converged",
            Self::OutOfDate => "OutOfDate",
        }
    }
}

/// Derive the phase; deletion always takes precedence over spec changes
pub fn derive_phase<K: BrokerResource>(resource: &K, retry_requested: bool) -> Phase {
    if resource.meta().deletion_timestamp.is_some() {
        return if has_finalizer(resource.meta()) {
            Phase::PendingDelete
        } else {
            Phase::Released
        };
    }

    let Some(status) = resource.broker_status() else {
        return if resource.external_id().is_some() {
            Phase::OutOfDate
        } else {
            Phase::NotCreated
        };
    };

    if status.operation().is_some() {
        return Phase::OperationInProgress;
    }

    let observed = status.has_observed(resource.generation());
    let reason = status.current_reason();

    if observed && !retry_requested && reason.is_some_and(Reason::is_terminal_failure) {
        return Phase::Halted;
    }

    if resource.external_id().is_none() {
        return if reason == Some(Reason::Recovering) {
            Phase::Recovering
        } else {
            Phase::NotCreated
        };
    }

    if observed && status.is_ready() {
        Phase::Converged
    } else {
        Phase::OutOfDate
    }
}

/// Whether the current generation ended in a permanent failure
pub fn is_halted<K: BrokerResource>(resource: &K, retry_requested: bool) -> bool {
    !retry_requested
        && resource.broker_status().is_some_and(|s| {
            s.has_observed(resource.generation())
                && s.current_reason().is_some_and(Reason::is_terminal_failure)
        })
}
