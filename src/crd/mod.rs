//! # Custom Resource Definitions
//!
//! CRD types for the Service Broker Controller.
//!
//! ## Module Structure
//!
//! - `instance.rs` - ServiceInstance resource and spec types
//! - `binding.rs` - ServiceBinding resource and spec types
//! - `status.rs` - Status types, conditions and operation descriptors
//! - `resource.rs` - Capability trait implemented by both kinds

mod binding;
mod instance;
mod resource;
mod status;

// Re-export all public types
pub use binding::{ServiceBinding, ServiceBindingSpec};
pub use instance::{ServiceInstance, ServiceInstanceSpec};
pub use resource::BrokerResource;
pub use status::{
    BrokerStatus, Condition, OperationDescriptor, OperationType, Reason, ServiceBindingStatus,
    ServiceInstanceStatus, READY_CONDITION,
};

/// Schema for opaque parameter payloads
pub(crate) fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "nullable": true,
        "x-kubernetes-preserve-unknown-fields": true
    })
}
