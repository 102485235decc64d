//! # Types
//!
//! Core types for the reconciler.

use crate::broker::{BrokerError, HttpClient, ReqwestHttpClient};
use crate::config::ControllerConfig;
use crate::controller::backoff::ExponentialBackoff;
use crate::credentials::{CredentialsError, CredentialsResolver};
use crate::crd::{ServiceBinding, ServiceInstance};
use crate::store::{KubeStore, ResourceStore, SecretStore, StoreError};
use anyhow::{Context, Result};
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Transient failures surfaced to the runtime; the error policy requeues with backoff.
/// Permanent failures never reach this type, they are projected onto status.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("broker: {0}")]
    Broker(#[from] BrokerError),
    #[error("credentials: {0}")]
    Credentials(#[from] CredentialsError),
}

impl ReconcilerError {
    /// Short label for metrics and logs
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Store(StoreError::Conflict(_)) => "conflict",
            Self::Store(_) => "store",
            Self::Broker(e) => e.label(),
            Self::Credentials(_) => "credentials",
        }
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: ExponentialBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            backoff: ExponentialBackoff::new(min, max),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }
}

/// Shared context handed to every reconcile invocation
#[derive(Clone)]
pub struct Reconciler {
    pub instances: Arc<dyn ResourceStore<ServiceInstance>>,
    pub bindings: Arc<dyn ResourceStore<ServiceBinding>>,
    pub secrets: Arc<dyn SecretStore>,
    pub http: Arc<dyn HttpClient>,
    pub resolver: CredentialsResolver,
    pub config: ControllerConfig,
    // Backoff state per resource (kind/namespace/name); only throttles retries,
    // losing it on restart just restarts the backoff sequence
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("management_namespace", &self.config.management_namespace)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Build a reconciler backed by the cluster API and a reqwest transport
    pub fn new(client: Client, config: ControllerConfig) -> Result<Self> {
        let store = Arc::new(KubeStore::new(client));
        let http = ReqwestHttpClient::new(config.http_timeout())
            .context("Failed to build broker HTTP client")?;
        Ok(Self::with_parts(
            Arc::clone(&store) as Arc<dyn ResourceStore<ServiceInstance>>,
            Arc::clone(&store) as Arc<dyn ResourceStore<ServiceBinding>>,
            store,
            Arc::new(http),
            config,
        ))
    }

    /// Build a reconciler from explicit stores and transport
    pub fn with_parts(
        instances: Arc<dyn ResourceStore<ServiceInstance>>,
        bindings: Arc<dyn ResourceStore<ServiceBinding>>,
        secrets: Arc<dyn SecretStore>,
        http: Arc<dyn HttpClient>,
        config: ControllerConfig,
    ) -> Self {
        let resolver = CredentialsResolver::new(Arc::clone(&secrets), config.management_namespace.clone());
        Self {
            instances,
            bindings,
            secrets,
            http,
            resolver,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Next backoff delay for a resource, counting the error
    pub fn next_backoff(&self, resource_key: &str) -> (Duration, u32) {
        let Ok(mut states) = self.backoff_states.lock() else {
            warn!("Backoff state lock poisoned, using minimum backoff for {}", resource_key);
            return (self.config.backoff_start(), 1);
        };
        let state = states
            .entry(resource_key.to_string())
            .or_insert_with(|| BackoffState::new(self.config.backoff_start(), self.config.backoff_max()));
        state.increment_error();
        (state.backoff.next_backoff(), state.error_count)
    }

    /// Reset backoff after a successful invocation; returns whether the resource was backing off
    pub fn reset_backoff(&self, resource_key: &str) -> bool {
        let Ok(mut states) = self.backoff_states.lock() else {
            return false;
        };
        states.remove(resource_key).is_some_and(|s| s.error_count > 0)
    }
}

/// Key identifying one resource in the backoff map
pub fn resource_key(kind: &str, namespace: &str, name: &str) -> String {
    format!("{kind}/{namespace}/{name}")
}
