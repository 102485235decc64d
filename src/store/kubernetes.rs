//! # Kubernetes Store
//!
//! [`ResourceStore`] and [`SecretStore`] backed by the Kubernetes API.

use super::{ResourceStore, SecretStore, StoreError};
use crate::constants::FIELD_MANAGER;
use crate::crd::BrokerResource;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;

/// Store implementation using a `kube::Client`
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Map a kube error onto the store taxonomy
fn classify(error: kube::Error, target: String) -> StoreError {
    match error {
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict(target),
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound(target),
        other => StoreError::Backend {
            target,
            message: other.to_string(),
        },
    }
}

fn target<K: kube::Resource<DynamicType = ()>>(namespace: &str, name: &str) -> String {
    format!("{}/{namespace}/{name}", K::kind(&()))
}

#[async_trait]
impl<K: BrokerResource> ResourceStore<K> for KubeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| classify(e, target::<K>(namespace, name)))
    }

    async fn list(&self, namespace: &str) -> Result<Vec<K>, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| classify(e, format!("{}/{namespace}", K::kind(&()))))
    }

    async fn update(&self, object: &K) -> Result<K, StoreError> {
        let namespace = object.namespace().unwrap_or_default();
        let name = object.name_any();
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        // replace carries metadata.resourceVersion, so a stale object is rejected with 409
        api.replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| classify(e, target::<K>(&namespace, &name)))
    }

    async fn update_status(&self, object: &K) -> Result<K, StoreError> {
        let namespace = object.namespace().unwrap_or_default();
        let name = object.name_any();
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);

        // Merge patch with a resourceVersion precondition
        let patch = json!({
            "metadata": { "resourceVersion": object.resource_version() },
            "status": object.status_value(),
        });
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        };
        api.patch_status(&name, &params, &Patch::Merge(&patch))
            .await
            .map_err(|e| classify(e, target::<K>(&namespace, &name)))
    }
}

#[async_trait]
impl SecretStore for KubeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| classify(e, format!("Secret/{namespace}/{name}")))
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let namespace = secret.namespace().unwrap_or_default();
        let name = secret.name_any();
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        api.create(&PostParams::default(), secret)
            .await
            .map_err(|e| classify(e, format!("Secret/{namespace}/{name}")))
    }

    async fn replace(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let namespace = secret.namespace().unwrap_or_default();
        let name = secret.name_any();
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&name, &PostParams::default(), secret)
            .await
            .map_err(|e| classify(e, format!("Secret/{namespace}/{name}")))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(classify(e, format!("Secret/{namespace}/{name}"))),
        }
    }
}
