//! # ServiceBinding Spec

use serde::{Deserialize, Serialize};

/// ServiceBinding Custom Resource Definition
///
/// Requests credentials for a ServiceInstance in the same namespace. The returned
/// credentials are written to a Secret owned by the binding.
///
/// # Example
///
/// ```yaml
/// apiVersion: service-broker.octopilot.io/v1alpha1
/// kind: ServiceBinding
/// metadata:
///   name: orders-db-app
///   namespace: shop
/// spec:
///   serviceInstanceName: orders-db
///   secretName: orders-db-credentials
/// ```
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ServiceBinding",
    group = "service-broker.octopilot.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ServiceBindingStatus",
    shortname = "sbd",
    printcolumn = r#"{"name":"Instance", "type":"string", "jsonPath":".spec.serviceInstanceName"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[0].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[0].reason"}, {"name":"Binding ID", "type":"string", "jsonPath":".status.bindingID", "priority":1}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingSpec {
    /// Name of the ServiceInstance (same namespace) to bind to
    pub service_instance_name: String,
    /// Name of the binding at the broker
    /// Defaults to metadata.name
    #[serde(default)]
    pub external_name: Option<String>,
    /// Secret receiving the credentials
    /// Defaults to metadata.name
    #[serde(default)]
    pub secret_name: Option<String>,
    /// Opaque binding parameters passed verbatim to the broker
    #[serde(default)]
    #[schemars(schema_with = "crate::crd::preserve_unknown_fields")]
    pub parameters: Option<serde_json::Value>,
}
