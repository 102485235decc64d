//! # Credential Materializer
//!
//! Writes binding credentials into a Secret owned by the binding.
//!
//! - Target name is `spec.secretName`, defaulting to the binding name
//! - String values are stored as their raw bytes, other JSON values as their JSON encoding
//! - The Secret carries a controller owner reference, so deleting the binding deletes it
//! - Materializing identical data twice is a no-op
//! - A Secret at the target name owned by someone else is never overwritten
//! - When the target name changes, the secret written under the old name is deleted

use crate::constants::FIELD_MANAGER;
use crate::crd::ServiceBinding;
use crate::observability::metrics;
use crate::store::{SecretStore, StoreError};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Label identifying secrets written by the controller
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    /// A secret with the target name exists and is not owned by this binding; permanent
    #[error("secret {namespace}/{name} already exists and is not owned by ServiceBinding {binding}")]
    Conflict {
        namespace: String,
        name: String,
        binding: String,
    },
    /// Store failure; transient
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convert a broker credential payload into secret data
pub fn secret_data(
    credentials: &serde_json::Map<String, serde_json::Value>,
) -> BTreeMap<String, ByteString> {
    credentials
        .iter()
        .map(|(key, value)| {
            let bytes = match value {
                serde_json::Value::String(s) => s.as_bytes().to_vec(),
                other => other.to_string().into_bytes(),
            };
            (key.clone(), ByteString(bytes))
        })
        .collect()
}

fn is_owned_by(secret: &Secret, binding: &ServiceBinding) -> bool {
    let Some(uid) = binding.uid() else {
        return false;
    };
    secret
        .owner_references()
        .iter()
        .any(|owner| owner.uid == uid)
}

/// Build the desired secret for a binding
pub fn desired_secret(
    binding: &ServiceBinding,
    data: BTreeMap<String, ByteString>,
) -> Result<Secret, StoreError> {
    let owner = binding.controller_owner_ref(&()).ok_or_else(|| StoreError::Backend {
        target: format!("ServiceBinding/{}", binding.name_any()),
        message: "binding has no uid yet".to_string(),
    })?;

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(binding.target_secret_name()),
            namespace: binding.namespace(),
            owner_references: Some(vec![owner]),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                FIELD_MANAGER.to_string(),
            )])),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    })
}

/// Write the credentials secret for a binding; returns the secret name
pub async fn materialize(
    secrets: &dyn SecretStore,
    binding: &ServiceBinding,
    credentials: &serde_json::Map<String, serde_json::Value>,
) -> Result<String, MaterializeError> {
    let namespace = binding.namespace().unwrap_or_default();
    let name = binding.target_secret_name();
    let mut desired = desired_secret(binding, secret_data(credentials))?;

    match secrets.get(&namespace, &name).await? {
        None => {
            secrets.create(&desired).await?;
            metrics::increment_credential_secrets_written();
            info!("🔑 Created credentials secret {}/{}", namespace, name);
        }
        Some(existing) => {
            if !is_owned_by(&existing, binding) {
                return Err(MaterializeError::Conflict {
                    namespace,
                    name,
                    binding: binding.name_any(),
                });
            }
            if existing.data == desired.data && existing.type_ == desired.type_ {
                debug!("Credentials secret {}/{} already up to date", namespace, name);
                return Ok(name);
            }
            desired.metadata.resource_version = existing.metadata.resource_version.clone();
            secrets.replace(&desired).await?;
            metrics::increment_credential_secrets_written();
            info!("🔑 Updated credentials secret {}/{}", namespace, name);
        }
    }
    Ok(name)
}

/// Whether the target secret exists and belongs to the binding
pub async fn is_materialized(
    secrets: &dyn SecretStore,
    binding: &ServiceBinding,
) -> Result<bool, StoreError> {
    let namespace = binding.namespace().unwrap_or_default();
    let secret = secrets.get(&namespace, &binding.target_secret_name()).await?;
    Ok(secret.is_some_and(|s| is_owned_by(&s, binding)))
}

/// Delete the secret written under a previous target name
pub async fn remove_previous(
    secrets: &dyn SecretStore,
    binding: &ServiceBinding,
) -> Result<(), StoreError> {
    let target = binding.target_secret_name();
    match binding.materialized_secret_name() {
        Some(previous) if previous != target => delete_owned(secrets, binding, previous).await,
        _ => Ok(()),
    }
}

/// Delete the credentials secrets owned by the binding
pub async fn remove(secrets: &dyn SecretStore, binding: &ServiceBinding) -> Result<(), StoreError> {
    remove_previous(secrets, binding).await?;
    delete_owned(secrets, binding, &binding.target_secret_name()).await
}

async fn delete_owned(
    secrets: &dyn SecretStore,
    binding: &ServiceBinding,
    name: &str,
) -> Result<(), StoreError> {
    let namespace = binding.namespace().unwrap_or_default();
    match secrets.get(&namespace, name).await? {
        Some(existing) if is_owned_by(&existing, binding) => {
            secrets.delete(&namespace, name).await?;
            info!("🗑️  Deleted credentials secret {}/{}", namespace, name);
            Ok(())
        }
        _ => Ok(()),
    }
}
