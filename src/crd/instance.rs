//! # ServiceInstance Spec

use serde::{Deserialize, Serialize};

/// ServiceInstance Custom Resource Definition
///
/// Requests a service instance from the broker.
///
/// # Example
///
/// ```yaml
/// apiVersion: service-broker.octopilot.io/v1alpha1
/// kind: ServiceInstance
/// metadata:
///   name: orders-db
///   namespace: shop
/// spec:
///   serviceOfferingName: postgresql
///   servicePlanName: small
///   parameters:
///     storageGb: 20
/// ```
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ServiceInstance",
    group = "service-broker.octopilot.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ServiceInstanceStatus",
    shortname = "si",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[0].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[0].reason"}, {"name":"Instance ID", "type":"string", "jsonPath":".status.instanceID", "priority":1}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstanceSpec {
    /// Name of the instance at the broker
    /// Defaults to metadata.name
    #[serde(default)]
    pub external_name: Option<String>,
    /// Service offering to instantiate
    pub service_offering_name: String,
    /// Plan of the service offering
    pub service_plan_name: String,
    /// Opaque provisioning parameters passed verbatim to the broker
    #[serde(default)]
    #[schemars(schema_with = "crate::crd::preserve_unknown_fields")]
    pub parameters: Option<serde_json::Value>,
}
