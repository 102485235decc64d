//! In-flight operation tracking.

use super::{continue_now, timestamp, Access, Session};
use crate::broker::{resource_id_from_operation_url, BrokerClient, BrokerError, ProvisionResult};
use crate::controller::reconciler::conditions::Outcome;
use crate::controller::reconciler::kinds::ResourceKind;
use crate::controller::reconciler::operation::{self, PollDecision, TrackedOperation, TrackerOutcome};
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::{OperationDescriptor, OperationType, Reason};
use crate::observability::metrics;
use chrono::Utc;
use kube_runtime::controller::Action;
use tracing::{debug, info, warn};

fn in_progress_message(category: OperationType) -> String {
    format!("{category} operation in progress")
}

impl<K: ResourceKind> Session<'_, K> {
    /// Record a newly accepted operation and poll it once right away
    pub(super) async fn start_operation(
        &mut self,
        client: &BrokerClient,
        descriptor: OperationDescriptor,
        deleting: bool,
    ) -> Result<Action, ReconcilerError> {
        info!(
            "⏳ Broker accepted {} for {}, tracking {}",
            descriptor.category,
            self.describe(),
            descriptor.url
        );
        let category = descriptor.category;
        self.record_created_id(&descriptor);
        self.object
            .broker_status_mut()
            .start_operation(descriptor, timestamp());
        self.project(Outcome::InProgress(in_progress_message(category)));
        self.persist().await?;
        metrics::increment_operations_in_flight();

        let Some(tracked) = self.tracked_operation() else {
            return Ok(continue_now());
        };
        self.poll(client, tracked, deleting).await
    }

    /// Poll the in-flight operation if the poll interval allows it
    pub(super) async fn track(&mut self, deleting: bool) -> Result<Action, ReconcilerError> {
        let Some(tracked) = self.tracked_operation() else {
            return Ok(continue_now());
        };

        match tracked.next_step(
            Utc::now(),
            self.ctx.config.poll_interval(),
            self.ctx.config.operation_max_age(),
        ) {
            PollDecision::Wait(remaining) => {
                debug!(
                    "Polled {} recently, next poll in {:?}",
                    self.describe(),
                    remaining
                );
                metrics::increment_requeues("operation-poll");
                return Ok(Action::requeue(remaining));
            }
            PollDecision::TimedOut => {
                let message = format!(
                    "{} operation {} did not complete within {}s",
                    tracked.descriptor.category,
                    tracked.descriptor.url,
                    self.ctx.config.operation_max_age().as_secs()
                );
                self.record_created_id(&tracked.descriptor);
                self.clear_operation();
                return self.fail(Reason::OperationTimedOut, message).await;
            }
            PollDecision::Poll => {}
        }

        let client = match self.broker().await? {
            Access::Granted(client) => client,
            Access::Blocked(message) => return self.blocked(message).await,
        };
        self.poll(&client, tracked, deleting).await
    }

    fn tracked_operation(&self) -> Option<TrackedOperation> {
        self.object
            .broker_status()
            .and_then(|status| TrackedOperation::from_status(status, Utc::now()))
    }

    /// A CREATE names its resource in the operation URL; keep that id so a failed
    /// or abandoned create is still deleted at the broker
    fn record_created_id(&mut self, descriptor: &OperationDescriptor) {
        if descriptor.category != OperationType::Create || self.object.external_id().is_some() {
            return;
        }
        if let Some(id) = resource_id_from_operation_url(&descriptor.url) {
            debug!("Recording broker id {} for {}", id, self.describe());
            self.object.set_external_id(Some(id));
        }
    }

    fn clear_operation(&mut self) {
        let status = self.object.broker_status_mut();
        if status.operation().is_some() {
            status.clear_operation();
            metrics::decrement_operations_in_flight();
        }
    }

    async fn poll(
        &mut self,
        client: &BrokerClient,
        tracked: TrackedOperation,
        deleting: bool,
    ) -> Result<Action, ReconcilerError> {
        let category = tracked.descriptor.category;
        let outcome = match operation::poll(client, &tracked.descriptor).await {
            Ok(outcome) => outcome,
            Err(e @ BrokerError::Transient(_)) => return Err(e.into()),
            Err(e) => {
                self.record_created_id(&tracked.descriptor);
                self.clear_operation();
                return self.fail(Reason::Failed, e.detail().to_string()).await;
            }
        };

        match outcome {
            TrackerOutcome::InProgress => {
                self.object.broker_status_mut().operation_last_polled_at = Some(timestamp());
                self.project(Outcome::InProgress(in_progress_message(category)));
                self.persist().await?;
                metrics::increment_requeues("operation-poll");
                Ok(Action::requeue(self.ctx.config.poll_interval()))
            }
            TrackerOutcome::Succeeded { resource_id } => {
                self.clear_operation();
                match category {
                    OperationType::Delete => self.release().await,
                    _ if deleting => {
                        // Deletion was requested meanwhile; keep the id so DELETE can target it
                        if self.object.external_id().is_none() {
                            if let Some(id) = resource_id {
                                self.object.set_external_id(Some(id));
                            }
                        }
                        self.persist().await?;
                        Ok(continue_now())
                    }
                    OperationType::Create => {
                        let result = ProvisionResult {
                            resource_id,
                            credentials: None,
                        };
                        self.complete(result, Reason::Provisioned).await
                    }
                    OperationType::Update => {
                        let result = ProvisionResult {
                            resource_id,
                            credentials: None,
                        };
                        self.complete(result, Reason::Updated).await
                    }
                }
            }
            TrackerOutcome::Failed { message } => {
                self.record_created_id(&tracked.descriptor);
                self.clear_operation();
                if deleting && category != OperationType::Delete {
                    debug!(
                        "{} operation of {} failed during deletion: {}",
                        category,
                        self.describe(),
                        message
                    );
                    self.persist().await?;
                    return Ok(continue_now());
                }
                self.fail(Reason::Failed, message).await
            }
            TrackerOutcome::Gone => {
                self.clear_operation();
                if category == OperationType::Delete {
                    return self.release().await;
                }
                warn!(
                    "⚠️  Broker no longer knows {} operation {} of {}",
                    category,
                    tracked.descriptor.url,
                    self.describe()
                );
                self.persist().await?;
                Ok(continue_now())
            }
        }
    }
}
