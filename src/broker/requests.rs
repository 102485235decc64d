//! Request bodies sent to the broker.
//!
//! `parameters` is the user's opaque payload and is passed through verbatim.

use serde::Serialize;

/// Body of `POST /v1/service_instances`
#[derive(Debug, Clone, Serialize)]
pub struct CreateInstanceRequest {
    pub name: String,
    pub service_offering_name: String,
    pub service_plan_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Body of `PATCH /v1/service_instances/{id}`
#[derive(Debug, Clone, Serialize)]
pub struct UpdateInstanceRequest {
    pub name: String,
    pub service_plan_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Body of `POST /v1/service_bindings`
#[derive(Debug, Clone, Serialize)]
pub struct CreateBindingRequest {
    pub name: String,
    pub service_instance_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}
