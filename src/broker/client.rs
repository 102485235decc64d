//! # Broker Client
//!
//! Issues provisioning requests and operation polls against the broker REST API.
//!
//! A [`BrokerClient`] is a session for one reconcile call: it holds the resolved
//! credentials and lazily obtains one bearer token, which is dropped with the
//! client. A 401 mid-call is transient and the next call starts a fresh session.
//!
//! Every response is reduced to one of three shapes:
//! - [`BrokerOutcome::Completed`] - synchronous success
//! - [`BrokerOutcome::Accepted`] - asynchronous acceptance with an operation URL
//! - [`BrokerError`] - classified failure

use super::auth::fetch_token;
use super::error::BrokerError;
use super::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use super::requests::{CreateBindingRequest, CreateInstanceRequest, UpdateInstanceRequest};
use super::responses::{ListResponse, OperationResponse, ResourceRecord, ResourceResponse};
use crate::credentials::BrokerCredentials;
use crate::crd::{OperationDescriptor, OperationType};
use crate::observability::metrics;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Broker API collections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    ServiceInstances,
    ServiceBindings,
}

impl Collection {
    pub fn path(self) -> &'static str {
        match self {
            Self::ServiceInstances => "service_instances",
            Self::ServiceBindings => "service_bindings",
        }
    }
}

/// Final identifier and payload of a completed operation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProvisionResult {
    pub resource_id: Option<String>,
    /// Binding credentials, present only on binding create/fetch
    pub credentials: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Non-error result of a create/update/delete call
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerOutcome {
    Completed(ProvisionResult),
    Accepted(OperationDescriptor),
}

/// State of an asynchronous operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    InProgress,
    Succeeded { resource_id: Option<String> },
    Failed { message: String },
}

/// State of a resource found by name
#[derive(Debug, Clone, PartialEq)]
pub enum FoundState {
    Ready,
    InProgress,
    Failed(String),
}

/// A resource found by name at the broker
#[derive(Debug, Clone, PartialEq)]
pub struct FoundResource {
    pub id: String,
    pub state: FoundState,
}

/// Broker API session for one reconcile call
pub struct BrokerClient {
    http: Arc<dyn HttpClient>,
    credentials: BrokerCredentials,
    token: OnceCell<String>,
}

impl fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerClient")
            .field("url", &self.credentials.url)
            .field("authenticated", &self.token.initialized())
            .finish_non_exhaustive()
    }
}

impl BrokerClient {
    pub fn new(http: Arc<dyn HttpClient>, credentials: BrokerCredentials) -> Self {
        Self {
            http,
            credentials,
            token: OnceCell::new(),
        }
    }

    pub async fn create_instance(
        &self,
        request: &CreateInstanceRequest,
    ) -> Result<BrokerOutcome, BrokerError> {
        let url = self.url(&format!("/v1/{}?async=true", Collection::ServiceInstances.path()));
        self.mutate(
            "create_instance",
            HttpMethod::Post,
            url,
            Some(request),
            OperationType::Create,
            None,
        )
        .await
    }

    pub async fn update_instance(
        &self,
        id: &str,
        request: &UpdateInstanceRequest,
    ) -> Result<BrokerOutcome, BrokerError> {
        let url = self.url(&format!(
            "/v1/{}/{id}?async=true",
            Collection::ServiceInstances.path()
        ));
        self.mutate(
            "update_instance",
            HttpMethod::Patch,
            url,
            Some(request),
            OperationType::Update,
            Some(id),
        )
        .await
    }

    pub async fn create_binding(
        &self,
        request: &CreateBindingRequest,
    ) -> Result<BrokerOutcome, BrokerError> {
        let url = self.url(&format!("/v1/{}?async=true", Collection::ServiceBindings.path()));
        self.mutate(
            "create_binding",
            HttpMethod::Post,
            url,
            Some(request),
            OperationType::Create,
            None,
        )
        .await
    }

    /// Delete an instance or binding
    pub async fn delete(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<BrokerOutcome, BrokerError> {
        let operation = match collection {
            Collection::ServiceInstances => "delete_instance",
            Collection::ServiceBindings => "delete_binding",
        };
        let url = self.url(&format!("/v1/{}/{id}?async=true", collection.path()));
        self.mutate::<()>(
            operation,
            HttpMethod::Delete,
            url,
            None,
            OperationType::Delete,
            Some(id),
        )
        .await
    }

    /// Fetch a binding with its credentials
    pub async fn get_binding(&self, id: &str) -> Result<ProvisionResult, BrokerError> {
        let url = self.url(&format!("/v1/{}/{id}", Collection::ServiceBindings.path()));
        let (response, elapsed) = self
            .execute::<()>("get_binding", HttpMethod::Get, url, None)
            .await?;
        let body: ResourceResponse = parse_body("get_binding", &response)?;
        metrics::record_broker_request("get_binding", "sync", elapsed);
        Ok(ProvisionResult {
            resource_id: body.id.or_else(|| Some(id.to_string())),
            credentials: body.credentials,
        })
    }

    /// Look a resource up by its broker name
    pub async fn find_by_name(
        &self,
        collection: Collection,
        name: &str,
        instance_id: Option<&str>,
    ) -> Result<Option<FoundResource>, BrokerError> {
        let query = field_query(name, instance_id);
        let base = self.url(&format!("/v1/{}", collection.path()));
        let url = reqwest::Url::parse_with_params(&base, &[("fieldQuery", query.as_str())])
            .map_err(|e| BrokerError::Transient(format!("invalid broker URL {base}: {e}")))?;

        let (response, elapsed) = self
            .execute::<()>("find_by_name", HttpMethod::Get, url.to_string(), None)
            .await?;
        let list: ListResponse = parse_body("find_by_name", &response)?;
        metrics::record_broker_request("find_by_name", "sync", elapsed);

        if list.items.len() > 1 {
            warn!(
                "Broker returned {} {} named '{}', adopting the first",
                list.items.len(),
                collection.path(),
                name
            );
        }
        Ok(list.items.into_iter().next().map(found_resource))
    }

    /// Poll an asynchronous operation
    pub async fn poll_operation(&self, operation_url: &str) -> Result<OperationStatus, BrokerError> {
        let url = self.operation_url(operation_url)?;
        let (response, elapsed) = self
            .execute::<()>("poll_operation", HttpMethod::Get, url, None)
            .await?;
        let body: OperationResponse = parse_body("poll_operation", &response)?;

        let status = match body.state.to_ascii_lowercase().as_str() {
            "succeeded" => OperationStatus::Succeeded {
                resource_id: body.resource_id,
            },
            "failed" => OperationStatus::Failed {
                message: failure_message(body.errors.as_ref(), body.description.as_deref()),
            },
            "in progress" | "pending" => OperationStatus::InProgress,
            other => {
                debug!("Unknown operation state '{}', treating as in progress", other);
                OperationStatus::InProgress
            }
        };
        let label = match &status {
            OperationStatus::InProgress => "in_progress",
            OperationStatus::Succeeded { .. } => "succeeded",
            OperationStatus::Failed { .. } => "failed",
        };
        metrics::record_broker_request("poll_operation", label, elapsed);
        Ok(status)
    }

    /// Absolute URL for a broker path
    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.credentials.url)
        } else {
            format!("{}/{path}", self.credentials.url)
        }
    }

    /// Resolve an operation location; absolute URLs must point at the broker itself,
    /// the bearer token is never sent elsewhere
    fn operation_url(&self, location: &str) -> Result<String, BrokerError> {
        if !(location.starts_with("http://") || location.starts_with("https://")) {
            return Ok(self.url(location));
        }
        let target = reqwest::Url::parse(location).map_err(|e| {
            BrokerError::Permanent(format!("poll_operation: invalid operation URL {location}: {e}"))
        })?;
        let broker = reqwest::Url::parse(&self.credentials.url).map_err(|e| {
            BrokerError::Transient(format!("invalid broker URL {}: {e}", self.credentials.url))
        })?;
        if target.origin() != broker.origin() {
            return Err(BrokerError::Permanent(format!(
                "poll_operation: operation URL {location} is not served by broker {}",
                self.credentials.url
            )));
        }
        Ok(location.to_string())
    }

    async fn bearer(&self) -> Result<&str, BrokerError> {
        self.token
            .get_or_try_init(|| fetch_token(self.http.as_ref(), &self.credentials))
            .await
            .map(String::as_str)
    }

    /// Send an authenticated request; non-success responses come back classified
    async fn execute<B: Serialize>(
        &self,
        operation: &'static str,
        method: HttpMethod,
        url: String,
        body: Option<&B>,
    ) -> Result<(HttpResponse, f64), BrokerError> {
        let token = self.bearer().await?;
        let mut request = HttpRequest::new(method, url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body).map_err(|e| {
                BrokerError::Permanent(format!("{operation}: request body is not valid JSON: {e}"))
            })?;
        }

        debug!("Broker request {} {}", method.as_str(), request.url);
        let start = Instant::now();
        let result = self.http.send(request).await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(response) if response.is_success() => Ok((response, elapsed)),
            Ok(response) => {
                let err = BrokerError::from_response(operation, &response);
                metrics::record_broker_request(operation, err.label(), elapsed);
                Err(err)
            }
            Err(e) => {
                metrics::record_broker_request(operation, "transient", elapsed);
                Err(BrokerError::Transient(format!("{operation}: {e}")))
            }
        }
    }

    /// Create/update/delete: 202 with Location is accepted, other 2xx is synchronous success
    async fn mutate<B: Serialize>(
        &self,
        operation: &'static str,
        method: HttpMethod,
        url: String,
        body: Option<&B>,
        category: OperationType,
        known_id: Option<&str>,
    ) -> Result<BrokerOutcome, BrokerError> {
        let (response, elapsed) = self.execute(operation, method, url, body).await?;

        if response.status == 202 {
            let Some(location) = response.header("Location").filter(|l| !l.is_empty()) else {
                metrics::record_broker_request(operation, "transient", elapsed);
                return Err(BrokerError::Transient(format!(
                    "{operation}: broker accepted the request without an operation Location"
                )));
            };
            metrics::record_broker_request(operation, "accepted", elapsed);
            return Ok(BrokerOutcome::Accepted(OperationDescriptor {
                url: location.to_string(),
                category,
            }));
        }

        let parsed: ResourceResponse = if response.body.is_empty() {
            ResourceResponse::default()
        } else {
            parse_body(operation, &response)?
        };
        metrics::record_broker_request(operation, "sync", elapsed);
        Ok(BrokerOutcome::Completed(ProvisionResult {
            resource_id: parsed.id.or_else(|| known_id.map(str::to_string)),
            credentials: parsed.credentials,
        }))
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(
    operation: &str,
    response: &HttpResponse,
) -> Result<T, BrokerError> {
    serde_json::from_slice(&response.body).map_err(|e| {
        metrics::record_broker_request(operation, "transient", 0.0);
        BrokerError::Transient(format!("{operation}: unparseable broker response: {e}"))
    })
}

/// Broker field query; single quotes inside values are doubled
fn field_query(name: &str, instance_id: Option<&str>) -> String {
    let quote = |value: &str| value.replace('\'', "''");
    let mut query = format!("name eq '{}'", quote(name));
    if let Some(instance_id) = instance_id {
        query.push_str(&format!(" and service_instance_id eq '{}'", quote(instance_id)));
    }
    query
}

fn found_resource(record: ResourceRecord) -> FoundResource {
    let state = match &record.last_operation {
        Some(op) if op.state.eq_ignore_ascii_case("failed") => FoundState::Failed(
            op.description
                .clone()
                .unwrap_or_else(|| format!("{} operation failed", op.operation_type.as_deref().unwrap_or("last"))),
        ),
        Some(op) if op.state.eq_ignore_ascii_case("in progress") => FoundState::InProgress,
        _ if record.ready == Some(false) => FoundState::InProgress,
        _ => FoundState::Ready,
    };
    FoundResource {
        id: record.id,
        state,
    }
}

fn failure_message(errors: Option<&serde_json::Value>, description: Option<&str>) -> String {
    match errors {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(serde_json::Value::Object(map)) => map
            .get("description")
            .or_else(|| map.get("error"))
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| serde_json::Value::Object(map.clone()).to_string(), str::to_string),
        Some(serde_json::Value::Null) | None => description
            .filter(|d| !d.is_empty())
            .unwrap_or("operation failed")
            .to_string(),
        Some(other) => other.to_string(),
    }
}

/// Resource id embedded in an operation URL (`/v1/<collection>/<id>/operations/<op>`)
pub fn resource_id_from_operation_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let index = segments.iter().position(|s| *s == "operations")?;
    index
        .checked_sub(1)
        .and_then(|i| segments.get(i))
        .filter(|id| !id.is_empty() && !matches!(**id, "service_instances" | "service_bindings"))
        .map(|id| (*id).to_string())
}
