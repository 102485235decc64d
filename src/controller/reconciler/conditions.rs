//! # Condition Projection
//!
//! Maps reconcile outcomes onto the Ready condition list and the
//! `observedGeneration` marker.
//!
//! | Outcome | Condition |
//! |---|---|
//! | blocked | Ready=False reason=Blocked |
//! | in progress | Ready=False reason=InProgress |
//! | recovering | Ready=False reason=Recovering |
//! | succeeded | Ready=True reason=Provisioned/Updated/Deleted |
//! | failed | Ready=False reason=Failed/OperationTimedOut |
//!
//! Transient failures are never projected; they only change the requeue delay.
//!
//! The list is ordered most recent first. An outcome with the same reason as the
//! current head replaces it (keeping its transition time when the status did not
//! flip); a new reason is prepended and any older entry with that reason dropped.

use crate::constants::MAX_CONDITIONS;
use crate::crd::{BrokerStatus, Condition, Reason, READY_CONDITION};

/// Outcome of a reconcile step that is visible to users
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Blocked(String),
    InProgress(String),
    Recovering(String),
    /// `reason` is one of Provisioned, Updated, Deleted
    Succeeded { reason: Reason, message: String },
    /// `reason` is Failed or OperationTimedOut
    Failed { reason: Reason, message: String },
}

impl Outcome {
    pub fn reason(&self) -> Reason {
        match self {
            Self::Blocked(_) => Reason::Blocked,
            Self::InProgress(_) => Reason::InProgress,
            Self::Recovering(_) => Reason::Recovering,
            Self::Succeeded { reason, .. } | Self::Failed { reason, .. } => *reason,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Blocked(m) | Self::InProgress(m) | Self::Recovering(m) => m,
            Self::Succeeded { message, .. } | Self::Failed { message, .. } => message,
        }
    }

    fn status(&self) -> &'static str {
        if matches!(self, Self::Succeeded { .. }) {
            "True"
        } else {
            "False"
        }
    }

    /// Success and permanent failure both mark the generation as processed
    pub fn advances_generation(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// Pure projection of an outcome onto a condition list
pub fn project(current: &[Condition], outcome: &Outcome, generation: i64, now: &str) -> Vec<Condition> {
    let reason = outcome.reason().as_str();
    let status = outcome.status();

    let mut next = Condition {
        r#type: READY_CONDITION.to_string(),
        status: status.to_string(),
        last_transition_time: Some(now.to_string()),
        reason: Some(reason.to_string()),
        message: Some(outcome.message().to_string()),
        observed_generation: Some(generation),
    };

    let mut conditions = Vec::with_capacity(current.len() + 1);
    match current.first() {
        Some(head) if head.reason.as_deref() == Some(reason) => {
            if head.status == status {
                next.last_transition_time.clone_from(&head.last_transition_time);
            }
            conditions.push(next);
            conditions.extend(current.iter().skip(1).cloned());
        }
        _ => {
            conditions.push(next);
            conditions.extend(
                current
                    .iter()
                    .filter(|c| c.reason.as_deref() != Some(reason))
                    .cloned(),
            );
        }
    }
    conditions.truncate(MAX_CONDITIONS);
    conditions
}

/// Apply an outcome to a status: conditions plus the generation marker
pub fn apply(status: &mut BrokerStatus, outcome: &Outcome, generation: i64, now: &str) {
    status.conditions = project(&status.conditions, outcome, generation, now);
    if outcome.advances_generation() {
        status.observed_generation = Some(generation);
    }
}
