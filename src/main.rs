//! # Service Broker Controller
//!
//! Kubernetes controller that provisions service instances and bindings through an
//! asynchronous service broker API.
//!
//! ## Overview
//!
//! 1. **Watches** `ServiceInstance` and `ServiceBinding` resources in all namespaces
//! 2. **Provisions** them at the broker (create, update, delete), tracking asynchronous operations
//! 3. **Materializes** binding credentials into Secrets owned by the binding
//! 4. **Reports** progress through the `Ready` condition and `observedGeneration`

use anyhow::Result;
use service_broker_controller::runtime::{initialize, run_watch_loops};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    run_watch_loops(
        init.client,
        init.reconciler,
        init.server_state,
        init.config.max_concurrent_reconciliations,
    )
    .await
}
