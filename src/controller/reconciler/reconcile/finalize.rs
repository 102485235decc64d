//! # Deletion
//!
//! The finalizer holds deletion until the broker confirms the external resource is
//! gone (synchronous success, completed DELETE operation, or not found).

use super::{continue_now, Access, Session};
use crate::broker::{BrokerError, BrokerOutcome};
use crate::controller::reconciler::conditions::Outcome;
use crate::controller::reconciler::kinds::ResourceKind;
use crate::controller::reconciler::metadata::remove_finalizer;
use crate::controller::reconciler::phase::is_halted;
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::{BrokerStatus, Reason};
use crate::store::StoreError;
use kube_runtime::controller::Action;
use tracing::{debug, info};

impl<K: ResourceKind> Session<'_, K> {
    pub(super) async fn finalize(&mut self, retry: bool) -> Result<Action, ReconcilerError> {
        if self
            .object
            .broker_status()
            .and_then(BrokerStatus::operation)
            .is_some()
        {
            return self.track(true).await;
        }

        // A failed DELETE is recorded against the generation bumped by the deletion request
        if is_halted(&self.object, retry) {
            debug!("Deletion of {} halted after failure", self.describe());
            return Ok(Action::await_change());
        }

        if let Some(blocker) = K::deletion_blocker(&self.object, self.ctx).await? {
            return self.blocked(blocker).await;
        }

        let Some(id) = self.object.external_id().map(str::to_string) else {
            let recovering = self
                .object
                .broker_status()
                .and_then(BrokerStatus::current_reason)
                == Some(Reason::Recovering);
            if recovering {
                return self.adopt_before_delete().await;
            }
            return self.release().await;
        };

        let client = match self.broker().await? {
            Access::Granted(client) => client,
            Access::Blocked(message) => return self.blocked(message).await,
        };

        info!("🗑️  Deleting {} ({}) at the broker", self.describe(), id);
        match client.delete(K::COLLECTION, &id).await {
            Ok(BrokerOutcome::Completed(_)) | Err(BrokerError::NotFound(_)) => self.release().await,
            Ok(BrokerOutcome::Accepted(descriptor)) => {
                self.start_operation(&client, descriptor, true).await
            }
            Err(e @ BrokerError::Transient(_)) => Err(e.into()),
            Err(e) => self.fail(Reason::Failed, e.detail().to_string()).await,
        }
    }

    /// A conflicting CREATE may have left a resource behind; find it before releasing
    async fn adopt_before_delete(&mut self) -> Result<Action, ReconcilerError> {
        let client = match self.broker().await? {
            Access::Granted(client) => client,
            Access::Blocked(message) => return self.blocked(message).await,
        };
        let name = self.object.external_name();
        let scope = self.object.lookup_scope().map(str::to_string);

        match client.find_by_name(K::COLLECTION, &name, scope.as_deref()).await {
            Ok(Some(found)) => {
                info!("🔗 Found broker resource {} for {}, deleting it", found.id, self.describe());
                self.object.set_external_id(Some(found.id));
                self.persist().await?;
                Ok(continue_now())
            }
            Ok(None) => self.release().await,
            Err(e @ BrokerError::Transient(_)) => Err(e.into()),
            Err(e) => self.fail(Reason::Failed, e.detail().to_string()).await,
        }
    }

    /// Broker side is gone: clean up owned objects and drop the finalizer
    pub(super) async fn release(&mut self) -> Result<Action, ReconcilerError> {
        K::release(&self.object, self.ctx).await?;

        self.object.set_external_id(None);
        self.project(Outcome::Succeeded {
            reason: Reason::Deleted,
            message: format!("{} deleted at the broker", K::KIND),
        });
        self.persist().await?;

        if remove_finalizer(self.object.meta_mut()) {
            match K::store(self.ctx).update(&self.object).await {
                Ok(_) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.released = true;
        info!("✅ Released {}", self.describe());
        Ok(Action::await_change())
    }
}
