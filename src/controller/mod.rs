//! # Controller
//!
//! Core controller modules for the Service Broker Controller.
//!
//! - `backoff`: Exponential backoff for transient errors
//! - `reconciler`: Reconciliation engine for instances and bindings

pub mod backoff;
pub mod reconciler;
