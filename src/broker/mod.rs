//! # Broker
//!
//! Client for the external asynchronous provisioning API.
//!
//! - `http.rs` - Transport trait and the reqwest implementation
//! - `auth.rs` - OAuth client-credentials token
//! - `client.rs` - Create/update/delete/fetch/find/poll calls
//! - `error.rs` - Error classification (transient, permanent, not found, conflict)
//! - `requests.rs` / `responses.rs` - Wire bodies

mod auth;
mod client;
mod error;
mod http;
mod requests;
mod responses;

pub use auth::token_endpoint;
pub use client::{
    resource_id_from_operation_url, BrokerClient, BrokerOutcome, Collection, FoundResource,
    FoundState, OperationStatus, ProvisionResult,
};
pub use error::{classify, BrokerError, ErrorClass};
pub use http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient, TransportError,
};
pub use requests::{CreateBindingRequest, CreateInstanceRequest, UpdateInstanceRequest};
