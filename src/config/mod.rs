//! # Configuration
//!
//! Controller-level settings loaded from environment variables.
//!
//! Environment variables are populated from a ConfigMap using `envFrom` in the
//! deployment. Every value has a default in [`crate::constants`].

mod controller;

pub use controller::{ControllerConfig, LogFormat};
