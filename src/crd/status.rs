//! # Resource Status
//!
//! Status types shared by ServiceInstance and ServiceBinding.
//!
//! Field names are the stable contract read by external tooling:
//! `instanceID` / `bindingID`, `operationURL`, `operationType`, `conditions[]`,
//! `observedGeneration`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition type written by the controller
pub const READY_CONDITION: &str = "Ready";

/// Category of an asynchronous broker operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A broker operation that has been started and not yet observed as terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub url: String,
    pub category: OperationType,
}

/// Reason tokens carried by the Ready condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Missing credentials or missing dependency; resolves externally
    Blocked,
    /// Broker accepted an asynchronous operation
    InProgress,
    Provisioned,
    Updated,
    Deleted,
    /// Permanent broker rejection; no retry until spec change or explicit retry
    Failed,
    /// An in-flight operation exceeded its maximum age
    OperationTimedOut,
    /// Create answered with a conflict; the next invocation looks the resource up by name
    Recovering,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blocked => "Blocked",
            Self::InProgress => "InProgress",
            Self::Provisioned => "Provisioned",
            Self::Updated => "Updated",
            Self::Deleted => "Deleted",
            Self::Failed => "Failed",
            Self::OperationTimedOut => "OperationTimedOut",
            Self::Recovering => "Recovering",
        }
    }

    /// Terminal failure reasons that halt automatic retries for the observed generation
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, Self::Failed | Self::OperationTimedOut)
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::Blocked,
            Self::InProgress,
            Self::Provisioned,
            Self::Updated,
            Self::Deleted,
            Self::Failed,
            Self::OperationTimedOut,
            Self::Recovering,
        ]
        .into_iter()
        .find(|reason| reason.as_str() == value)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
    /// Generation this condition was computed for
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn reason(&self) -> Option<Reason> {
        self.reason.as_deref().and_then(Reason::parse)
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Operation tracking, conditions and generation marker common to both kinds
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStatus {
    /// URL of the in-flight broker operation
    #[serde(default, rename = "operationURL")]
    pub operation_url: Option<String>,
    /// Category of the in-flight broker operation
    #[serde(default)]
    pub operation_type: Option<OperationType>,
    /// When the in-flight operation was accepted by the broker (RFC3339)
    #[serde(default)]
    pub operation_started_at: Option<String>,
    /// When the in-flight operation was last polled (RFC3339)
    #[serde(default)]
    pub operation_last_polled_at: Option<String>,
    /// Conditions, most recent first
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Generation last fully processed
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

impl BrokerStatus {
    /// The in-flight operation, present only when both URL and category are recorded
    pub fn operation(&self) -> Option<OperationDescriptor> {
        match (&self.operation_url, self.operation_type) {
            (Some(url), Some(category)) if !url.is_empty() => Some(OperationDescriptor {
                url: url.clone(),
                category,
            }),
            _ => None,
        }
    }

    pub fn start_operation(&mut self, descriptor: OperationDescriptor, started_at: String) {
        self.operation_url = Some(descriptor.url);
        self.operation_type = Some(descriptor.category);
        self.operation_started_at = Some(started_at);
        self.operation_last_polled_at = None;
    }

    pub fn clear_operation(&mut self) {
        self.operation_url = None;
        self.operation_type = None;
        self.operation_started_at = None;
        self.operation_last_polled_at = None;
    }

    /// The authoritative (most recent) condition
    pub fn current_condition(&self) -> Option<&Condition> {
        self.conditions.first()
    }

    pub fn current_reason(&self) -> Option<Reason> {
        self.current_condition().and_then(Condition::reason)
    }

    pub fn is_ready(&self) -> bool {
        self.current_condition().is_some_and(Condition::is_true)
    }

    pub fn has_observed(&self, generation: i64) -> bool {
        self.observed_generation == Some(generation)
    }
}

/// Status of the ServiceInstance resource
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstanceStatus {
    /// Identifier assigned by the broker
    #[serde(default, rename = "instanceID")]
    pub instance_id: Option<String>,
    #[serde(flatten)]
    pub broker: BrokerStatus,
}

/// Status of the ServiceBinding resource
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingStatus {
    /// Broker identifier of the bound instance
    #[serde(default, rename = "instanceID")]
    pub instance_id: Option<String>,
    /// Identifier assigned by the broker
    #[serde(default, rename = "bindingID")]
    pub binding_id: Option<String>,
    /// Secret the credentials were last written to
    #[serde(default)]
    pub secret_name: Option<String>,
    #[serde(flatten)]
    pub broker: BrokerStatus,
}
