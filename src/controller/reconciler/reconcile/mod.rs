//! # Reconciliation Engine
//!
//! One invocation reads the current object, derives its lifecycle phase and takes
//! exactly one step towards convergence:
//!
//! | Phase | Step |
//! |---|---|
//! | PendingDelete | poll the in-flight operation, or check blockers and DELETE |
//! | OperationInProgress | poll the in-flight operation (rate limited) |
//! | NotCreated | check dependencies and credentials, then CREATE |
//! | Recovering | look the resource up by name after a conflicting CREATE |
//! | OutOfDate | UPDATE (instances) or re-fetch credentials (bindings) |
//! | Converged | nothing, unless owned output (binding secret) was lost |
//! | Halted | nothing; no broker calls |
//!
//! Every status write carries the resourceVersion that was read. A conflict is
//! returned as a transient error and the next delivery recomputes from fresh state.

mod finalize;
mod provision;
mod track;

use crate::broker::BrokerClient;
use crate::controller::reconciler::conditions::{self, Outcome};
use crate::controller::reconciler::kinds::ResourceKind;
use crate::controller::reconciler::metadata::{
    add_finalizer, clear_retry_annotation, retry_requested,
};
use crate::controller::reconciler::phase::{derive_phase, Phase};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::Reason;
use crate::observability::metrics;
use chrono::{SecondsFormat, Utc};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Run one reconcile step for the named resource
pub async fn run<K: ResourceKind>(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcilerError> {
    let Some(object) = K::store(ctx).get(namespace, name).await? else {
        debug!("{} {}/{} no longer exists", K::KIND, namespace, name);
        return Ok(Action::await_change());
    };

    let retry = retry_requested(object.meta());
    let phase = derive_phase(&object, retry);
    debug!(
        "{} {}/{} phase={} generation={} retry={}",
        K::KIND,
        namespace,
        name,
        phase.as_str(),
        object.generation(),
        retry
    );

    let mut session = Session::new(ctx, object);
    if !matches!(phase, Phase::PendingDelete | Phase::Released) {
        session.ensure_finalizer().await?;
    }

    let action = match phase {
        Phase::Released => Action::await_change(),
        Phase::PendingDelete => session.finalize(retry).await?,
        Phase::OperationInProgress => session.track(false).await?,
        Phase::Halted => {
            debug!(
                "{} {}/{} failed for generation {}, waiting for a spec change or retry request",
                K::KIND,
                namespace,
                name,
                session.object.generation()
            );
            Action::await_change()
        }
        Phase::Converged => session.converged().await?,
        Phase::Recovering => session.recover().await?,
        Phase::NotCreated => session.create().await?,
        Phase::OutOfDate => session.update().await?,
    };

    if retry && !session.released {
        session.clear_retry().await;
    }
    Ok(action)
}

/// Credentials lookup result
enum Access {
    Granted(BrokerClient),
    Blocked(String),
}

/// State of one reconcile invocation
struct Session<'a, K: ResourceKind> {
    ctx: &'a Reconciler,
    object: K,
    /// Status as last read from or written to the store
    stored_status: serde_json::Value,
    /// Finalizer removed; the object may already be gone
    released: bool,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl<'a, K: ResourceKind> Session<'a, K> {
    fn new(ctx: &'a Reconciler, object: K) -> Self {
        let stored_status = object.status_value();
        Self {
            ctx,
            object,
            stored_status,
            released: false,
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} {}/{}",
            K::KIND,
            self.object.namespace().unwrap_or_default(),
            self.object.name_any()
        )
    }

    /// Take over an object returned by a successful write
    fn accept(&mut self, updated: K) {
        self.stored_status = updated.status_value();
        self.object = updated;
    }

    /// No broker calls unless owned output has to be rebuilt
    async fn converged(&mut self) -> Result<Action, ReconcilerError> {
        if K::needs_repair(&self.object, self.ctx).await? {
            info!("🔧 {} lost its owned output, rebuilding", self.describe());
            return self.update().await;
        }
        metrics::increment_requeues("resync");
        Ok(Action::requeue(self.ctx.config.resync_interval()))
    }

    async fn ensure_finalizer(&mut self) -> Result<(), ReconcilerError> {
        if !add_finalizer(self.object.meta_mut()) {
            return Ok(());
        }
        let updated = K::store(self.ctx).update(&self.object).await?;
        self.accept(updated);
        debug!("Added finalizer to {}", self.describe());
        Ok(())
    }

    /// Write status when it differs from what is stored
    async fn persist(&mut self) -> Result<(), ReconcilerError> {
        if self.object.status_value() == self.stored_status {
            debug!("Status of {} unchanged, skipping write", self.describe());
            return Ok(());
        }
        let updated = K::store(self.ctx).update_status(&self.object).await?;
        self.accept(updated);
        Ok(())
    }

    fn project(&mut self, outcome: Outcome) {
        let generation = self.object.generation();
        conditions::apply(
            self.object.broker_status_mut(),
            &outcome,
            generation,
            &timestamp(),
        );
    }

    /// Resolve credentials; configuration problems block instead of failing
    async fn broker(&self) -> Result<Access, ReconcilerError> {
        let namespace = self.object.namespace().unwrap_or_default();
        match self.ctx.resolver.resolve(&namespace).await {
            Ok(credentials) => Ok(Access::Granted(BrokerClient::new(
                Arc::clone(&self.ctx.http),
                credentials,
            ))),
            Err(e) if e.is_blocking() => Ok(Access::Blocked(e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn blocked(&mut self, message: String) -> Result<Action, ReconcilerError> {
        info!("⏸️  {} blocked: {}", self.describe(), message);
        self.project(Outcome::Blocked(message));
        self.persist().await?;
        metrics::increment_requeues("blocked");
        Ok(Action::requeue(self.ctx.config.blocked_requeue()))
    }

    /// Permanent failure: the generation is processed, no automatic retry
    async fn fail(&mut self, reason: Reason, message: String) -> Result<Action, ReconcilerError> {
        warn!("❌ {} {}: {}", self.describe(), reason, message);
        self.project(Outcome::Failed { reason, message });
        self.persist().await?;
        Ok(Action::await_change())
    }

    async fn clear_retry(&mut self) {
        if !clear_retry_annotation(self.object.meta_mut()) {
            return;
        }
        match K::store(self.ctx).update(&self.object).await {
            Ok(updated) => {
                self.accept(updated);
                debug!("Cleared retry annotation on {}", self.describe());
            }
            Err(e) => warn!("Failed to clear retry annotation on {}: {}", self.describe(), e),
        }
    }
}

/// Requeue immediately; the next invocation continues from the written state
fn continue_now() -> Action {
    Action::requeue(Duration::ZERO)
}
