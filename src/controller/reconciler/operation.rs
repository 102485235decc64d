//! # Operation Tracker
//!
//! Tracks one in-flight asynchronous broker operation.
//!
//! Polls are rate limited: an operation is never polled again before the poll
//! interval has elapsed since the last poll. An operation older than the maximum
//! age is failed with `OperationTimedOut` instead of being polled forever.

use crate::broker::{resource_id_from_operation_url, BrokerClient, BrokerError, OperationStatus};
use crate::crd::{BrokerStatus, OperationDescriptor};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// An operation descriptor with its timing, parsed from status
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedOperation {
    pub descriptor: OperationDescriptor,
    pub started_at: DateTime<Utc>,
    pub last_polled_at: Option<DateTime<Utc>>,
}

/// What to do with an in-flight operation right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDecision {
    /// Poll the broker now
    Poll,
    /// Too soon since the last poll; requeue after the remaining time
    Wait(Duration),
    /// Exceeded its maximum age
    TimedOut,
}

/// Interpreted result of one poll
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerOutcome {
    InProgress,
    Succeeded { resource_id: Option<String> },
    Failed { message: String },
    /// The broker no longer knows the operation
    Gone,
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
}

impl TrackedOperation {
    /// Build from status; a missing or unreadable start time counts from `now`
    pub fn from_status(status: &BrokerStatus, now: DateTime<Utc>) -> Option<Self> {
        let descriptor = status.operation()?;
        Some(Self {
            descriptor,
            started_at: parse_time(status.operation_started_at.as_deref()).unwrap_or(now),
            last_polled_at: parse_time(status.operation_last_polled_at.as_deref()),
        })
    }

    pub fn next_step(
        &self,
        now: DateTime<Utc>,
        poll_interval: Duration,
        max_age: Duration,
    ) -> PollDecision {
        let age = (now - self.started_at).to_std().unwrap_or_default();
        if age > max_age {
            return PollDecision::TimedOut;
        }

        if let Some(last) = self.last_polled_at {
            let since = (now - last).to_std().unwrap_or_default();
            if since < poll_interval {
                return PollDecision::Wait(poll_interval - since);
            }
        }
        PollDecision::Poll
    }
}

/// Poll the operation and interpret the terminal states
pub async fn poll(
    client: &BrokerClient,
    descriptor: &OperationDescriptor,
) -> Result<TrackerOutcome, BrokerError> {
    match client.poll_operation(&descriptor.url).await {
        Ok(OperationStatus::InProgress) => Ok(TrackerOutcome::InProgress),
        Ok(OperationStatus::Succeeded { resource_id }) => Ok(TrackerOutcome::Succeeded {
            resource_id: resource_id
                .filter(|id| !id.is_empty())
                .or_else(|| resource_id_from_operation_url(&descriptor.url)),
        }),
        Ok(OperationStatus::Failed { message }) => Ok(TrackerOutcome::Failed { message }),
        Err(BrokerError::NotFound(_)) => Ok(TrackerOutcome::Gone),
        Err(e) => Err(e),
    }
}
