//! # Broker Credentials
//!
//! Locates and parses the broker access credentials.
//!
//! The secret `service-broker-operator` holds the keys `clientid`, `clientsecret`,
//! `url` and `tokenurl`. A secret of that name in the resource's own namespace
//! overrides the management-namespace secret entirely (no field-level merging).
//!
//! Credentials are resolved on every reconcile call so rotation is picked up
//! without a restart.

use crate::constants::BROKER_SECRET_NAME;
use crate::store::{SecretStore, StoreError};
use k8s_openapi::api::core::v1::Secret;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

const KEY_CLIENT_ID: &str = "clientid";
const KEY_CLIENT_SECRET: &str = "clientsecret";
const KEY_URL: &str = "url";
const KEY_TOKEN_URL: &str = "tokenurl";

/// Broker access credentials for one reconcile call
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct BrokerCredentials {
    pub client_id: String,
    client_secret: String,
    /// Broker API base URL, without trailing slash
    pub url: String,
    /// OAuth server base URL, without trailing slash
    pub token_url: String,
}

impl fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("url", &self.url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// Why credentials could not be resolved
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("broker credentials secret {namespace}/{name} not found")]
    Missing { namespace: String, name: String },
    #[error("broker credentials secret {secret} is missing key '{key}'")]
    MissingKey { secret: String, key: &'static str },
    #[error("broker credentials secret {secret} key '{key}' is not valid UTF-8")]
    InvalidUtf8 { secret: String, key: &'static str },
    #[error("broker credentials secret {secret} key '{key}' is not an absolute http(s) URL")]
    InvalidUrl { secret: String, key: &'static str },
    /// Reading the secret failed; transient
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CredentialsError {
    /// Missing or malformed secrets block the resource; store failures are retried with backoff
    pub fn is_blocking(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

impl BrokerCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            url: url.into().trim_end_matches('/').to_string(),
            token_url: token_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Parse the credentials record from a secret
    pub fn from_secret(secret: &Secret) -> Result<Self, CredentialsError> {
        let secret_ref = format!(
            "{}/{}",
            secret.metadata.namespace.as_deref().unwrap_or_default(),
            secret.metadata.name.as_deref().unwrap_or_default()
        );

        let client_id = read_key(secret, &secret_ref, KEY_CLIENT_ID)?;
        let client_secret = read_key(secret, &secret_ref, KEY_CLIENT_SECRET)?;
        let url = read_key(secret, &secret_ref, KEY_URL)?;
        let token_url = read_key(secret, &secret_ref, KEY_TOKEN_URL)?;

        validate_url(&url, &secret_ref, KEY_URL)?;
        validate_url(&token_url, &secret_ref, KEY_TOKEN_URL)?;

        Ok(Self::new(client_id, client_secret, url, token_url))
    }
}

/// Read one key from `data`, falling back to `stringData`
fn read_key(secret: &Secret, secret_ref: &str, key: &'static str) -> Result<String, CredentialsError> {
    let value = if let Some(bytes) = secret.data.as_ref().and_then(|d| d.get(key)) {
        String::from_utf8(bytes.0.clone()).map_err(|_| CredentialsError::InvalidUtf8 {
            secret: secret_ref.to_string(),
            key,
        })?
    } else if let Some(value) = secret.string_data.as_ref().and_then(|d| d.get(key)) {
        value.clone()
    } else {
        return Err(CredentialsError::MissingKey {
            secret: secret_ref.to_string(),
            key,
        });
    };

    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(CredentialsError::MissingKey {
            secret: secret_ref.to_string(),
            key,
        });
    }
    Ok(value)
}

fn validate_url(value: &str, secret_ref: &str, key: &'static str) -> Result<(), CredentialsError> {
    let valid = reqwest::Url::parse(value)
        .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some());
    if valid {
        Ok(())
    } else {
        Err(CredentialsError::InvalidUrl {
            secret: secret_ref.to_string(),
            key,
        })
    }
}

/// Resolves broker credentials for a resource namespace
#[derive(Clone)]
pub struct CredentialsResolver {
    secrets: Arc<dyn SecretStore>,
    management_namespace: String,
}

impl fmt::Debug for CredentialsResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsResolver")
            .field("management_namespace", &self.management_namespace)
            .finish_non_exhaustive()
    }
}

impl CredentialsResolver {
    pub fn new(secrets: Arc<dyn SecretStore>, management_namespace: impl Into<String>) -> Self {
        Self {
            secrets,
            management_namespace: management_namespace.into(),
        }
    }

    /// Resolve credentials: namespace override first, then the management namespace
    pub async fn resolve(&self, namespace: &str) -> Result<BrokerCredentials, CredentialsError> {
        if namespace != self.management_namespace {
            if let Some(secret) = self.secrets.get(namespace, BROKER_SECRET_NAME).await? {
                debug!(
                    "Using broker credentials override {}/{}",
                    namespace, BROKER_SECRET_NAME
                );
                return BrokerCredentials::from_secret(&secret);
            }
        }

        match self
            .secrets
            .get(&self.management_namespace, BROKER_SECRET_NAME)
            .await?
        {
            Some(secret) => BrokerCredentials::from_secret(&secret),
            None => Err(CredentialsError::Missing {
                namespace: self.management_namespace.clone(),
                name: BROKER_SECRET_NAME.to_string(),
            }),
        }
    }
}
