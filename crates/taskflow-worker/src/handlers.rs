//! Built-in task handlers. Plug new task types here or register your own
//! implementations of [`TaskHandler`] before starting the worker.

use crate::handler::{TaskHandler, TaskHandlerRegistry};
use async_trait::async_trait;
use taskflow_core::{HandlerError, TaskEnvelope};
use tracing::{info, warn};

/// Register the handlers this binary ships with.
pub fn register_builtin(registry: &TaskHandlerRegistry) {
    registry.register("send_email", SendEmailHandler);
    registry.register("resize_image", ResizeImageHandler);
    registry.register("process_payment", ProcessPaymentHandler);
    registry.register("fail_task", FailTaskHandler);
}

pub struct SendEmailHandler;

#[async_trait]
impl TaskHandler for SendEmailHandler {
    async fn execute(&self, envelope: &TaskEnvelope) -> Result<(), HandlerError> {
        let recipient = envelope
            .payload
            .get("recipient")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let subject = envelope
            .payload
            .get("subject")
            .and_then(|v| v.as_str())
            .unwrap_or("(no subject)");

        // Simulated work.
        info!(task_id = %envelope.task_id, recipient, subject, "Email sent");
        Ok(())
    }
}

pub struct ResizeImageHandler;

#[async_trait]
impl TaskHandler for ResizeImageHandler {
    async fn execute(&self, envelope: &TaskEnvelope) -> Result<(), HandlerError> {
        info!(task_id = %envelope.task_id, "Image resized");
        Ok(())
    }
}

pub struct ProcessPaymentHandler;

#[async_trait]
impl TaskHandler for ProcessPaymentHandler {
    async fn execute(&self, envelope: &TaskEnvelope) -> Result<(), HandlerError> {
        info!(task_id = %envelope.task_id, "Payment processed");
        Ok(())
    }
}

/// Always fails with a transient error; exercises the retry and dead letter
/// paths end to end.
pub struct FailTaskHandler;

#[async_trait]
impl TaskHandler for FailTaskHandler {
    async fn execute(&self, envelope: &TaskEnvelope) -> Result<(), HandlerError> {
        warn!(
            task_id = %envelope.task_id,
            attempt_count = envelope.attempt_count,
            "Simulating task failure"
        );
        Err(HandlerError::Transient(
            "intentional failure for retry testing".to_string(),
        ))
    }
}
