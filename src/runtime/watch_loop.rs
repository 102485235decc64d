//! # Watch Loop
//!
//! Runs one controller per resource kind. Both share the reconciler context and
//! are stopped together on SIGTERM/SIGINT.

use crate::controller::reconciler::{
    reconcile_binding, reconcile_instance, Reconciler, ReconcilerError,
};
use crate::crd::{ServiceBinding, ServiceInstance};
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::server::ServerState;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::{Client, Resource};
use kube_runtime::controller::{self, Action, Config as ControllerRuntimeConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{debug, info};

type ControllerResult<K> =
    Result<(ObjectRef<K>, Action), controller::Error<ReconcilerError, watcher::Error>>;

/// Run the ServiceInstance and ServiceBinding controllers until shutdown
pub async fn run_watch_loops(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    max_concurrent_reconciliations: u16,
) -> Result<(), anyhow::Error> {
    let runtime_config = ControllerRuntimeConfig::default().concurrency(max_concurrent_reconciliations);

    // Mark not ready as soon as a shutdown signal arrives
    let shutdown_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, initiating graceful shutdown...");
            shutdown_state.set_ready(false);
            info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
        }
    });

    let instances: Api<ServiceInstance> = Api::all(client.clone());
    let bindings: Api<ServiceBinding> = Api::all(client.clone());
    let secrets: Api<Secret> = Api::all(client);

    info!(
        "Starting controllers (max {} concurrent reconciliations per kind)...",
        max_concurrent_reconciliations
    );

    let instance_controller =
        Controller::new(instances, watcher::Config::default().any_semantic())
            .with_config(runtime_config.clone())
            .shutdown_on_signal()
            .run(
                reconcile_instance,
                handle_reconciliation_error::<ServiceInstance>,
                Arc::clone(&reconciler),
            )
            .for_each(report::<ServiceInstance>);

    // Owned credential secrets trigger their binding; a deleted one is rebuilt
    let binding_controller = Controller::new(bindings, watcher::Config::default().any_semantic())
        .owns(secrets, watcher::Config::default())
        .with_config(runtime_config)
        .shutdown_on_signal()
        .run(
            reconcile_binding,
            handle_reconciliation_error::<ServiceBinding>,
            reconciler,
        )
        .for_each(report::<ServiceBinding>);

    futures::join!(instance_controller, binding_controller);

    server_state.set_ready(false);
    info!("Controllers stopped gracefully");
    Ok(())
}

async fn report<K: Resource<DynamicType = ()>>(result: ControllerResult<K>) {
    let kind = K::kind(&());
    match result {
        Ok((obj, action)) => debug!("Reconciled {} {}: {:?}", kind, obj.name, action),
        // Already logged and counted by the error policy
        Err(controller::Error::ReconcilerFailed(_, obj)) => {
            debug!("Reconcile of {} {} failed", kind, obj.name);
        }
        Err(e) => {
            handle_watch_stream_error(&kind, &format!("{e:?}"));
        }
    }
}
