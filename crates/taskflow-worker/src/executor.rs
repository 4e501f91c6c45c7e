use crate::handler::TaskHandler;
use std::sync::Arc;
use std::time::Duration;
use taskflow_core::{HandlerError, TaskEnvelope};
use tokio::time::timeout;
use tracing::error;

/// Runs a handler with a bounded execution time and panic isolation.
///
/// Both a timeout and a panic are reported as transient handler failures,
/// so a stuck or crashing handler enters the normal retry/quarantine branch
/// instead of hanging or killing the consumer.
pub struct TaskExecutor {
    handler: Arc<dyn TaskHandler>,
    task_timeout: Duration,
}

impl TaskExecutor {
    pub fn new(handler: Arc<dyn TaskHandler>, task_timeout: Duration) -> Self {
        TaskExecutor {
            handler,
            task_timeout,
        }
    }

    pub async fn execute(&self, envelope: &TaskEnvelope) -> Result<(), HandlerError> {
        let handler = self.handler.clone();
        let task = envelope.clone();
        let mut join = tokio::spawn(async move { handler.execute(&task).await });

        match timeout(self.task_timeout, &mut join).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                if join_error.is_panic() {
                    error!(task_id = %envelope.task_id, "Handler panicked");
                    Err(HandlerError::Transient(
                        "handler panicked during execution".to_string(),
                    ))
                } else {
                    Err(HandlerError::Transient(
                        "handler task was cancelled".to_string(),
                    ))
                }
            }
            Err(_) => {
                // Cancel the overrunning handler so it cannot complete its
                // side effect after a retry has been scheduled. The abort
                // takes effect at the handler's next await point.
                join.abort();
                error!(
                    task_id = %envelope.task_id,
                    timeout_secs = self.task_timeout.as_secs(),
                    "Handler timed out"
                );
                Err(HandlerError::Transient(format!(
                    "handler timed out after {:?}",
                    self.task_timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Map;

    struct SleepHandler {
        duration: Duration,
    }

    #[async_trait]
    impl TaskHandler for SleepHandler {
        async fn execute(&self, _envelope: &TaskEnvelope) -> Result<(), HandlerError> {
            tokio::time::sleep(self.duration).await;
            Ok(())
        }
    }

    struct PanicHandler;

    #[async_trait]
    impl TaskHandler for PanicHandler {
        async fn execute(&self, _envelope: &TaskEnvelope) -> Result<(), HandlerError> {
            panic!("boom");
        }
    }

    fn envelope() -> TaskEnvelope {
        TaskEnvelope::new("sleep", Map::new())
    }

    #[tokio::test]
    async fn test_execute_success() {
        let executor = TaskExecutor::new(
            Arc::new(SleepHandler {
                duration: Duration::from_millis(1),
            }),
            Duration::from_secs(5),
        );
        executor.execute(&envelope()).await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_is_transient_failure() {
        let executor = TaskExecutor::new(
            Arc::new(SleepHandler {
                duration: Duration::from_secs(60),
            }),
            Duration::from_millis(20),
        );

        let err = executor.execute(&envelope()).await.unwrap_err();
        assert!(!err.is_permanent());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_handler_is_aborted() {
        use std::sync::atomic::{AtomicBool, Ordering};

        struct FlagHandler {
            done: Arc<AtomicBool>,
        }

        #[async_trait]
        impl TaskHandler for FlagHandler {
            async fn execute(&self, _envelope: &TaskEnvelope) -> Result<(), HandlerError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                self.done.store(true, Ordering::SeqCst);
                Ok(())
            }
        }

        let done = Arc::new(AtomicBool::new(false));
        let executor = TaskExecutor::new(
            Arc::new(FlagHandler { done: done.clone() }),
            Duration::from_secs(1),
        );

        let err = executor.execute(&envelope()).await.unwrap_err();
        assert!(!err.is_permanent());

        // Long after the handler's sleep would have elapsed, its side
        // effect must not have run.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panic_is_transient_failure() {
        let executor = TaskExecutor::new(Arc::new(PanicHandler), Duration::from_secs(5));

        let err = executor.execute(&envelope()).await.unwrap_err();
        assert!(!err.is_permanent());
        assert!(err.to_string().contains("panicked"));
    }
}
