use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Failed to decode task envelope: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode task envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Failure classification reported by task handlers.
///
/// Transient failures are retried with exponential backoff; permanent
/// failures go straight to the dead letter queue without consuming retries.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Permanent failure: {0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, HandlerError::Permanent(_))
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
