//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use service_broker_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (ServiceInstance, ServiceBinding, status types)
//! - Reconciler types (Reconciler, ReconcilerError, entry points)
//! - Store and transport traits for wiring alternative backends
//! - Config types

// CRD types - most commonly used
pub use crate::crd::*;

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    reconcile, reconcile_binding, reconcile_instance, BackoffState, Reconciler, ReconcilerError,
    ResourceKind,
};

// Seams - backing store and broker transport
pub use crate::broker::{BrokerError, HttpClient, HttpRequest, HttpResponse, TransportError};
pub use crate::store::{ResourceStore, SecretStore, StoreError};

// Config types - for configuration management
pub use crate::config::{ControllerConfig, LogFormat};
