//! Service Broker Controller Library
//!
//! This library provides the core functionality for the Service Broker Controller:
//! reconciliation of `ServiceInstance` and `ServiceBinding` resources against an
//! asynchronous service broker API.
//!
//! ## Quick Start
//!
//! ```rust
//! use service_broker_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod broker;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod credentials;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod server;
pub mod store;
