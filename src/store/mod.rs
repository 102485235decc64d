//! # Backing Store
//!
//! Get/list/update contract against the cluster API.
//!
//! Every write carries the `resourceVersion` that was read, so a write against an
//! object that changed in the meantime fails with [`StoreError::Conflict`]. The
//! engine never retries a conflict inside one invocation; the next delivery
//! recomputes from fresh state.
//!
//! - [`ResourceStore`] - ServiceInstance / ServiceBinding objects
//! - [`SecretStore`] - Secrets (broker credentials in, binding credentials out)
//! - [`KubeStore`] - implementation of both against a `kube::Client`

mod kubernetes;

pub use kubernetes::KubeStore;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;

/// Errors returned by the backing store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object changed since it was read (optimistic concurrency)
    #[error("conflict writing {0}: object was modified since it was read")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("store request for {target} failed: {message}")]
    Backend { target: String, message: String },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Store for one custom resource kind
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Fetch the current object; `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>;

    async fn list(&self, namespace: &str) -> Result<Vec<K>, StoreError>;

    /// Replace metadata and spec (finalizers, annotations)
    async fn update(&self, object: &K) -> Result<K, StoreError>;

    /// Replace the status sub-object
    async fn update_status(&self, object: &K) -> Result<K, StoreError>;
}

/// Store for Secrets
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;

    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError>;

    /// Replace an existing secret; conflicts when the secret changed since read
    async fn replace(&self, secret: &Secret) -> Result<Secret, StoreError>;

    /// Delete a secret; deleting a missing secret succeeds
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}
