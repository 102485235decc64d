//! Response bodies returned by the broker and the OAuth server.

use serde::Deserialize;

/// OAuth client-credentials token response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Instance or binding returned synchronously
#[derive(Debug, Default, Deserialize)]
pub struct ResourceResponse {
    #[serde(default)]
    pub id: Option<String>,
    /// Binding credentials, keys defined by the broker
    #[serde(default)]
    pub credentials: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Result page of a find-by-name query
#[derive(Debug, Default, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub items: Vec<ResourceRecord>,
}

/// One resource in a list result
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ready: Option<bool>,
    #[serde(default)]
    pub last_operation: Option<LastOperation>,
}

/// Last operation reported on a listed resource
#[derive(Debug, Clone, Deserialize)]
pub struct LastOperation {
    #[serde(default, rename = "type")]
    pub operation_type: Option<String>,
    pub state: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of `GET {operationURL}`
#[derive(Debug, Deserialize)]
pub struct OperationResponse {
    pub state: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Error payload of a failed operation (object or string)
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
}

/// Error body of a non-success response
#[derive(Debug, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
