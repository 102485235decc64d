//! # Resource Kinds
//!
//! Kind-specific behaviour the engine delegates to: which broker calls to make,
//! what a resource depends on, what blocks its deletion and what finishing a
//! successful operation means.

use crate::broker::{
    BrokerClient, BrokerError, BrokerOutcome, Collection, CreateBindingRequest,
    CreateInstanceRequest, ProvisionResult, UpdateInstanceRequest,
};
use crate::controller::reconciler::secrets::{self, MaterializeError};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{BrokerResource, ServiceBinding, ServiceInstance};
use crate::store::{ResourceStore, StoreError};
use async_trait::async_trait;
use kube::ResourceExt;
use std::sync::Arc;

/// Whether a resource may be created at the broker yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// Dependencies satisfied; `parent_id` is the broker id of the parent, if any
    Ready { parent_id: Option<String> },
    Blocked(String),
}

/// Result of applying a successful broker result to the resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Ready,
    /// Identifier recorded, more work needed on the next invocation
    Pending(String),
    /// Permanent failure while finishing (e.g. credentials secret conflict)
    Failed(String),
}

#[async_trait]
pub trait ResourceKind: BrokerResource {
    /// Broker collection holding this kind
    const COLLECTION: Collection;

    fn store(ctx: &Reconciler) -> &Arc<dyn ResourceStore<Self>>;

    /// Extra scope for name lookups (bindings are scoped to their instance)
    fn lookup_scope(&self) -> Option<&str> {
        None
    }

    /// Record the parent's broker id before creating
    fn set_parent_id(&mut self, _id: String) {}

    async fn dependency(&self, ctx: &Reconciler) -> Result<Dependency, StoreError>;

    async fn create(
        &self,
        client: &BrokerClient,
        parent_id: Option<&str>,
    ) -> Result<BrokerOutcome, BrokerError>;

    async fn update(&self, client: &BrokerClient, id: &str) -> Result<BrokerOutcome, BrokerError>;

    /// Apply a successful result: record the id and any kind-specific output
    async fn complete(
        &mut self,
        ctx: &Reconciler,
        result: ProvisionResult,
    ) -> Result<Completion, ReconcilerError>;

    /// Whether cluster-side output of a converged resource was lost and must be rebuilt
    async fn needs_repair(&self, _ctx: &Reconciler) -> Result<bool, StoreError> {
        Ok(false)
    }

    /// Reason deletion must wait, if any; re-checked on every delete attempt
    async fn deletion_blocker(&self, ctx: &Reconciler) -> Result<Option<String>, StoreError>;

    /// Clean up cluster-side objects owned by the resource once the broker side is gone
    async fn release(&self, ctx: &Reconciler) -> Result<(), StoreError>;
}

fn record_id<K: BrokerResource>(resource: &mut K, id: Option<String>) {
    if let Some(id) = id.filter(|id| !id.is_empty()) {
        resource.set_external_id(Some(id));
    }
}

#[async_trait]
impl ResourceKind for ServiceInstance {
    const COLLECTION: Collection = Collection::ServiceInstances;

    fn store(ctx: &Reconciler) -> &Arc<dyn ResourceStore<Self>> {
        &ctx.instances
    }

    async fn dependency(&self, _ctx: &Reconciler) -> Result<Dependency, StoreError> {
        Ok(Dependency::Ready { parent_id: None })
    }

    async fn create(
        &self,
        client: &BrokerClient,
        _parent_id: Option<&str>,
    ) -> Result<BrokerOutcome, BrokerError> {
        client
            .create_instance(&CreateInstanceRequest {
                name: self.external_name(),
                service_offering_name: self.spec.service_offering_name.clone(),
                service_plan_name: self.spec.service_plan_name.clone(),
                parameters: self.parameters().cloned(),
            })
            .await
    }

    async fn update(&self, client: &BrokerClient, id: &str) -> Result<BrokerOutcome, BrokerError> {
        client
            .update_instance(
                id,
                &UpdateInstanceRequest {
                    name: self.external_name(),
                    service_plan_name: self.spec.service_plan_name.clone(),
                    parameters: self.parameters().cloned(),
                },
            )
            .await
    }

    async fn complete(
        &mut self,
        _ctx: &Reconciler,
        result: ProvisionResult,
    ) -> Result<Completion, ReconcilerError> {
        record_id(self, result.resource_id);
        if self.external_id().is_none() {
            return Ok(Completion::Failed(
                "broker reported success without an instance id".to_string(),
            ));
        }
        Ok(Completion::Ready)
    }

    async fn deletion_blocker(&self, ctx: &Reconciler) -> Result<Option<String>, StoreError> {
        let namespace = self.namespace().unwrap_or_default();
        let name = self.name_any();
        let dependents: Vec<String> = ctx
            .bindings
            .list(&namespace)
            .await?
            .into_iter()
            .filter(|b| b.spec.service_instance_name == name)
            .map(|b| b.name_any())
            .collect();

        if dependents.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!(
            "{} ServiceBinding(s) still reference this instance: {}",
            dependents.len(),
            dependents.join(", ")
        )))
    }

    async fn release(&self, _ctx: &Reconciler) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl ResourceKind for ServiceBinding {
    const COLLECTION: Collection = Collection::ServiceBindings;

    fn store(ctx: &Reconciler) -> &Arc<dyn ResourceStore<Self>> {
        &ctx.bindings
    }

    fn lookup_scope(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.instance_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    fn set_parent_id(&mut self, id: String) {
        self.status.get_or_insert_with(Default::default).instance_id = Some(id);
    }

    async fn dependency(&self, ctx: &Reconciler) -> Result<Dependency, StoreError> {
        let namespace = self.namespace().unwrap_or_default();
        let instance_name = &self.spec.service_instance_name;

        let Some(instance) = ctx.instances.get(&namespace, instance_name).await? else {
            return Ok(Dependency::Blocked(format!(
                "ServiceInstance {instance_name} not found"
            )));
        };
        if instance.metadata.deletion_timestamp.is_some() {
            return Ok(Dependency::Blocked(format!(
                "ServiceInstance {instance_name} is being deleted"
            )));
        }
        let ready = instance.broker_status().is_some_and(|s| s.is_ready());
        match instance.external_id() {
            Some(id) if ready => Ok(Dependency::Ready {
                parent_id: Some(id.to_string()),
            }),
            _ => Ok(Dependency::Blocked(format!(
                "ServiceInstance {instance_name} is not Ready"
            ))),
        }
    }

    async fn create(
        &self,
        client: &BrokerClient,
        parent_id: Option<&str>,
    ) -> Result<BrokerOutcome, BrokerError> {
        let Some(instance_id) = parent_id else {
            return Err(BrokerError::Permanent(format!(
                "create_binding: ServiceInstance {} has no instance id",
                self.spec.service_instance_name
            )));
        };
        client
            .create_binding(&CreateBindingRequest {
                name: self.external_name(),
                service_instance_id: instance_id.to_string(),
                parameters: self.parameters().cloned(),
            })
            .await
    }

    /// Bindings have no broker-side update; the binding is re-fetched and its
    /// credentials re-materialized
    async fn update(&self, client: &BrokerClient, id: &str) -> Result<BrokerOutcome, BrokerError> {
        let mut result = client.get_binding(id).await?;
        result.credentials.get_or_insert_with(serde_json::Map::new);
        Ok(BrokerOutcome::Completed(result))
    }

    async fn complete(
        &mut self,
        ctx: &Reconciler,
        result: ProvisionResult,
    ) -> Result<Completion, ReconcilerError> {
        record_id(self, result.resource_id);
        if self.external_id().is_none() {
            return Ok(Completion::Failed(
                "broker reported success without a binding id".to_string(),
            ));
        }
        let Some(credentials) = result.credentials else {
            return Ok(Completion::Pending("fetching binding credentials".to_string()));
        };

        match secrets::materialize(ctx.secrets.as_ref(), self, &credentials).await {
            Ok(name) => {
                secrets::remove_previous(ctx.secrets.as_ref(), self).await?;
                self.status.get_or_insert_with(Default::default).secret_name = Some(name);
                Ok(Completion::Ready)
            }
            Err(e @ MaterializeError::Conflict { .. }) => Ok(Completion::Failed(e.to_string())),
            Err(MaterializeError::Store(e)) => Err(e.into()),
        }
    }

    async fn needs_repair(&self, ctx: &Reconciler) -> Result<bool, StoreError> {
        Ok(!secrets::is_materialized(ctx.secrets.as_ref(), self).await?)
    }

    async fn deletion_blocker(&self, _ctx: &Reconciler) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn release(&self, ctx: &Reconciler) -> Result<(), StoreError> {
        secrets::remove(ctx.secrets.as_ref(), self).await
    }
}
