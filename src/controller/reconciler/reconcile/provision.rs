//! Create, update and create-recovery paths.

use super::{continue_now, Access, Session};
use crate::broker::{BrokerError, BrokerOutcome, FoundState, ProvisionResult};
use crate::controller::reconciler::conditions::Outcome;
use crate::controller::reconciler::kinds::{Completion, Dependency, ResourceKind};
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::Reason;
use crate::observability::metrics;
use kube_runtime::controller::Action;
use tracing::{info, warn};

impl<K: ResourceKind> Session<'_, K> {
    pub(super) async fn create(&mut self) -> Result<Action, ReconcilerError> {
        let parent_id = match K::dependency(&self.object, self.ctx).await? {
            Dependency::Ready { parent_id } => parent_id,
            Dependency::Blocked(message) => return self.blocked(message).await,
        };
        let client = match self.broker().await? {
            Access::Granted(client) => client,
            Access::Blocked(message) => return self.blocked(message).await,
        };
        if let Some(id) = &parent_id {
            self.object.set_parent_id(id.clone());
        }

        info!(
            "🚀 Creating {} as '{}' at the broker",
            self.describe(),
            self.object.external_name()
        );
        match self.object.create(&client, parent_id.as_deref()).await {
            Ok(BrokerOutcome::Completed(result)) => self.complete(result, Reason::Provisioned).await,
            Ok(BrokerOutcome::Accepted(descriptor)) => {
                self.start_operation(&client, descriptor, false).await
            }
            Err(BrokerError::Conflict(detail)) => {
                warn!(
                    "⚠️  Create of {} conflicted, looking it up by name next: {}",
                    self.describe(),
                    detail
                );
                self.project(Outcome::Recovering(format!(
                    "{detail}; looking up an existing resource named '{}'",
                    self.object.external_name()
                )));
                self.persist().await?;
                metrics::increment_requeues("recovering");
                Ok(Action::requeue(self.ctx.config.poll_interval()))
            }
            Err(e @ BrokerError::Transient(_)) => Err(e.into()),
            Err(e) => self.fail(Reason::Failed, e.detail().to_string()).await,
        }
    }

    /// Adopt a resource a previous CREATE may have created without us recording it
    pub(super) async fn recover(&mut self) -> Result<Action, ReconcilerError> {
        let client = match self.broker().await? {
            Access::Granted(client) => client,
            Access::Blocked(message) => return self.blocked(message).await,
        };
        let name = self.object.external_name();
        let scope = self.object.lookup_scope().map(str::to_string);

        match client.find_by_name(K::COLLECTION, &name, scope.as_deref()).await {
            Ok(Some(found)) => match found.state {
                FoundState::Ready => {
                    info!("🔗 Adopting existing broker resource {} for {}", found.id, self.describe());
                    let result = ProvisionResult {
                        resource_id: Some(found.id),
                        credentials: None,
                    };
                    self.complete(result, Reason::Provisioned).await
                }
                FoundState::InProgress => {
                    self.project(Outcome::Recovering(format!(
                        "broker resource '{name}' ({}) is still being provisioned",
                        found.id
                    )));
                    self.persist().await?;
                    metrics::increment_requeues("recovering");
                    Ok(Action::requeue(self.ctx.config.poll_interval()))
                }
                FoundState::Failed(message) => {
                    self.object.set_external_id(Some(found.id));
                    self.fail(Reason::Failed, message).await
                }
            },
            Ok(None) => {
                self.fail(
                    Reason::Failed,
                    format!("broker reported a conflict creating '{name}' but no resource with that name exists"),
                )
                .await
            }
            Err(e @ BrokerError::Transient(_)) => Err(e.into()),
            Err(e) => self.fail(Reason::Failed, e.detail().to_string()).await,
        }
    }

    pub(super) async fn update(&mut self) -> Result<Action, ReconcilerError> {
        let Some(id) = self.object.external_id().map(str::to_string) else {
            return Ok(continue_now());
        };
        let client = match self.broker().await? {
            Access::Granted(client) => client,
            Access::Blocked(message) => return self.blocked(message).await,
        };
        let reason = if self.object.observed_generation().is_none() {
            Reason::Provisioned
        } else {
            Reason::Updated
        };

        info!(
            "🔄 Updating {} (generation {}) at the broker",
            self.describe(),
            self.object.generation()
        );
        match self.object.update(&client, &id).await {
            Ok(BrokerOutcome::Completed(result)) => self.complete(result, reason).await,
            Ok(BrokerOutcome::Accepted(descriptor)) => {
                self.start_operation(&client, descriptor, false).await
            }
            Err(BrokerError::NotFound(detail)) => {
                warn!(
                    "⚠️  {} ({}) no longer exists at the broker, recreating: {}",
                    self.describe(),
                    id,
                    detail
                );
                self.object.set_external_id(None);
                self.persist().await?;
                Ok(continue_now())
            }
            Err(e @ BrokerError::Transient(_)) => Err(e.into()),
            Err(e) => self.fail(Reason::Failed, e.detail().to_string()).await,
        }
    }

    /// Finish a successful CREATE/UPDATE
    pub(super) async fn complete(
        &mut self,
        result: ProvisionResult,
        reason: Reason,
    ) -> Result<Action, ReconcilerError> {
        match self.object.complete(self.ctx, result).await? {
            Completion::Ready => {
                let message = format!(
                    "{} {} {}",
                    K::KIND,
                    self.object.external_id().unwrap_or_default(),
                    reason.as_str().to_lowercase()
                );
                info!("✅ {}: {}", self.describe(), message);
                self.project(Outcome::Succeeded { reason, message });
                self.persist().await?;
                metrics::increment_requeues("resync");
                Ok(Action::requeue(self.ctx.config.resync_interval()))
            }
            Completion::Pending(message) => {
                self.project(Outcome::InProgress(message));
                self.persist().await?;
                Ok(continue_now())
            }
            Completion::Failed(message) => self.fail(Reason::Failed, message).await,
        }
    }
}
