//! # Broker Resource Capabilities
//!
//! The capability set the reconciliation engine needs from a resource kind.
//! Both [`ServiceInstance`] and [`ServiceBinding`] implement it, so the engine is
//! written once and stays generic over the kind.

use crate::crd::{
    BrokerStatus, ServiceBinding, ServiceBindingStatus, ServiceInstance, ServiceInstanceStatus,
};
use kube::{Resource, ResourceExt};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// Spec/status accessors shared by every broker-backed resource
pub trait BrokerResource:
    Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Kind name used in logs and metrics
    const KIND: &'static str;

    /// Name of the resource at the broker (`spec.externalName`, defaulting to metadata.name)
    fn external_name(&self) -> String;

    /// Opaque parameter payload, passed through to the broker untouched
    fn parameters(&self) -> Option<&serde_json::Value>;

    /// Broker-assigned identifier (`instanceID` / `bindingID`)
    fn external_id(&self) -> Option<&str>;

    fn set_external_id(&mut self, id: Option<String>);

    fn broker_status(&self) -> Option<&BrokerStatus>;

    /// Mutable status, created on first access
    fn broker_status_mut(&mut self) -> &mut BrokerStatus;

    /// Generation of the current spec
    fn generation(&self) -> i64 {
        self.meta().generation.unwrap_or(0)
    }

    fn observed_generation(&self) -> Option<i64> {
        self.broker_status().and_then(|s| s.observed_generation)
    }

    /// Status serialized for change detection and status writes
    fn status_value(&self) -> serde_json::Value;
}

impl BrokerResource for ServiceInstance {
    const KIND: &'static str = "ServiceInstance";

    fn external_name(&self) -> String {
        self.spec
            .external_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.name_any())
    }

    fn parameters(&self) -> Option<&serde_json::Value> {
        self.spec.parameters.as_ref()
    }

    fn external_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.instance_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    fn set_external_id(&mut self, id: Option<String>) {
        self.status
            .get_or_insert_with(ServiceInstanceStatus::default)
            .instance_id = id;
    }

    fn broker_status(&self) -> Option<&BrokerStatus> {
        self.status.as_ref().map(|s| &s.broker)
    }

    fn broker_status_mut(&mut self) -> &mut BrokerStatus {
        &mut self
            .status
            .get_or_insert_with(ServiceInstanceStatus::default)
            .broker
    }

    fn status_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.status).unwrap_or(serde_json::Value::Null)
    }
}

impl BrokerResource for ServiceBinding {
    const KIND: &'static str = "ServiceBinding";

    fn external_name(&self) -> String {
        self.spec
            .external_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.name_any())
    }

    fn parameters(&self) -> Option<&serde_json::Value> {
        self.spec.parameters.as_ref()
    }

    fn external_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.binding_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    fn set_external_id(&mut self, id: Option<String>) {
        self.status
            .get_or_insert_with(ServiceBindingStatus::default)
            .binding_id = id;
    }

    fn broker_status(&self) -> Option<&BrokerStatus> {
        self.status.as_ref().map(|s| &s.broker)
    }

    fn broker_status_mut(&mut self) -> &mut BrokerStatus {
        &mut self
            .status
            .get_or_insert_with(ServiceBindingStatus::default)
            .broker
    }

    fn status_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.status).unwrap_or(serde_json::Value::Null)
    }
}

impl ServiceBinding {
    /// Secret receiving the binding credentials (`spec.secretName`, defaulting to metadata.name)
    pub fn target_secret_name(&self) -> String {
        self.spec
            .secret_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.name_any())
    }

    /// Secret the credentials were last materialized into
    pub fn materialized_secret_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.secret_name.as_deref())
            .filter(|n| !n.is_empty())
    }
}
