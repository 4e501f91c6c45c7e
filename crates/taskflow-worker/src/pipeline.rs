use crate::config::DedupFailurePolicy;
use crate::dedup::DedupStore;
use crate::executor::TaskExecutor;
use crate::handler::TaskHandlerRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use taskflow_broker::{AckDecision, DeliveryHandler, TaskPublisher};
use taskflow_core::{BackoffPolicy, RetryDecision, TaskEnvelope};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub backoff: BackoffPolicy,
    pub dedup_ttl: Duration,
    pub task_timeout: Duration,
    pub dedup_failure_policy: DedupFailurePolicy,
}

/// The per-delivery state machine:
/// decode -> dedup check -> dispatch -> ack / retry re-publish / dead letter.
///
/// Every path that completes normally settles the original delivery exactly
/// once. Only infrastructure failures (dedup store or broker unreachable)
/// nack, handing the message back to the broker's own redelivery mechanics.
pub struct Pipeline {
    registry: Arc<TaskHandlerRegistry>,
    dedup: Arc<dyn DedupStore>,
    publisher: Arc<dyn TaskPublisher>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        registry: Arc<TaskHandlerRegistry>,
        dedup: Arc<dyn DedupStore>,
        publisher: Arc<dyn TaskPublisher>,
        config: PipelineConfig,
    ) -> Self {
        Pipeline {
            registry,
            dedup,
            publisher,
            config,
        }
    }

    pub async fn process(&self, body: &[u8]) -> AckDecision {
        // Decode. An unparsable body cannot be retried meaningfully: log it
        // as a poison message, ack, and drop.
        let envelope = match TaskEnvelope::from_bytes(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(
                    error = %e,
                    raw_body = %String::from_utf8_lossy(body),
                    "Poison message, dropping"
                );
                return AckDecision::Ack;
            }
        };

        info!(
            task_id = %envelope.task_id,
            task_type = %envelope.task_type,
            attempt_count = envelope.attempt_count,
            "Task received"
        );

        // Dedup check. The store being down is not "not completed".
        match self.dedup.has_completed(envelope.task_id).await {
            Ok(true) => {
                info!(task_id = %envelope.task_id, "Duplicate task, skipping");
                return AckDecision::Ack;
            }
            Ok(false) => {}
            Err(e) => match self.config.dedup_failure_policy {
                DedupFailurePolicy::Requeue => {
                    warn!(
                        task_id = %envelope.task_id,
                        error = %e,
                        "Dedup store unavailable, returning delivery to the broker"
                    );
                    return AckDecision::Nack { requeue: true };
                }
                DedupFailurePolicy::Proceed => {
                    warn!(
                        task_id = %envelope.task_id,
                        error = %e,
                        "Dedup store unavailable, proceeding without duplicate suppression"
                    );
                }
            },
        }

        // Dispatch. An unregistered type is permanent: no retry count will
        // make it known.
        let Some(handler) = self.registry.get(&envelope.task_type) else {
            warn!(
                task_id = %envelope.task_id,
                task_type = %envelope.task_type,
                "Unknown task type"
            );
            let reason = format!("unknown task type: {}", envelope.task_type);
            return self.quarantine(envelope, &reason).await;
        };

        let executor = TaskExecutor::new(handler, self.config.task_timeout);
        match executor.execute(&envelope).await {
            Ok(()) => {
                if let Err(e) = self
                    .dedup
                    .mark_completed(envelope.task_id, self.config.dedup_ttl)
                    .await
                {
                    // The side effect already happened; the lost record only
                    // narrows the duplicate suppression window.
                    warn!(
                        task_id = %envelope.task_id,
                        error = %e,
                        "Failed to record completion in dedup store"
                    );
                }
                info!(
                    task_id = %envelope.task_id,
                    task_type = %envelope.task_type,
                    "Task completed"
                );
                AckDecision::Ack
            }
            Err(e) if e.is_permanent() => {
                error!(
                    task_id = %envelope.task_id,
                    error = %e,
                    "Permanent handler failure"
                );
                let reason = e.to_string();
                self.quarantine(envelope, &reason).await
            }
            Err(e) => self.handle_transient_failure(envelope, &e.to_string()).await,
        }
    }

    /// Retry branch: sleep the backoff delay (blocking this consumer only),
    /// re-publish with an incremented attempt count, then ack the original.
    /// Ack-after-republish keeps exactly one copy of the task live: the
    /// original is settled only once its successor is durably queued.
    async fn handle_transient_failure(&self, envelope: TaskEnvelope, error: &str) -> AckDecision {
        let max_retries = envelope
            .max_retries
            .unwrap_or(self.config.backoff.max_retries);

        match self
            .config
            .backoff
            .decide_with_max(envelope.attempt_count, max_retries)
        {
            RetryDecision::Retry { delay } => {
                warn!(
                    task_id = %envelope.task_id,
                    task_type = %envelope.task_type,
                    attempt_count = envelope.attempt_count,
                    max_retries,
                    delay_secs = delay.as_secs_f64(),
                    error,
                    "Task failed, scheduling retry"
                );

                tokio::time::sleep(delay).await;

                let retry = envelope.next_attempt();
                let body = match retry.to_bytes() {
                    Ok(body) => body,
                    Err(e) => {
                        error!(task_id = %retry.task_id, error = %e, "Failed to encode retry");
                        return AckDecision::Nack { requeue: true };
                    }
                };

                match self
                    .publisher
                    .publish_task(&body, &retry.task_id.to_string())
                    .await
                {
                    Ok(()) => {
                        info!(
                            task_id = %retry.task_id,
                            attempt_count = retry.attempt_count,
                            "Task re-queued for retry"
                        );
                        AckDecision::Ack
                    }
                    Err(e) => {
                        error!(
                            task_id = %retry.task_id,
                            error = %e,
                            "Failed to re-publish retry, returning delivery to the broker"
                        );
                        AckDecision::Nack { requeue: true }
                    }
                }
            }
            RetryDecision::Quarantine => {
                error!(
                    task_id = %envelope.task_id,
                    task_type = %envelope.task_type,
                    attempt_count = envelope.attempt_count,
                    max_retries,
                    error,
                    "Retries exhausted, dead-lettering"
                );
                let reason = format!("retries exhausted: {error}");
                self.quarantine(envelope, &reason).await
            }
        }
    }

    /// Dead letter branch: publish the envelope with its terminal marker,
    /// then ack the original.
    async fn quarantine(&self, envelope: TaskEnvelope, reason: &str) -> AckDecision {
        let task_id = envelope.task_id;
        let dead = envelope.into_dead_letter(reason);
        let body = match dead.to_bytes() {
            Ok(body) => body,
            Err(e) => {
                error!(%task_id, error = %e, "Failed to encode dead letter");
                return AckDecision::Nack { requeue: true };
            }
        };

        match self
            .publisher
            .publish_dead_letter(&body, &task_id.to_string())
            .await
        {
            Ok(()) => {
                error!(%task_id, reason, "Task published to dead letter queue");
                AckDecision::Ack
            }
            Err(e) => {
                error!(
                    %task_id,
                    error = %e,
                    "Failed to publish dead letter, returning delivery to the broker"
                );
                AckDecision::Nack { requeue: true }
            }
        }
    }
}

#[async_trait]
impl DeliveryHandler for Pipeline {
    async fn handle(&self, body: &[u8]) -> AckDecision {
        self.process(body).await
    }
}
