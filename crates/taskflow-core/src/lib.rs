mod backoff;
mod envelope;
mod error;

pub use backoff::{BackoffPolicy, RetryDecision, MAX_RETRY_DELAY};
pub use envelope::{TaskEnvelope, TaskId};
pub use error::{HandlerError, Result, TaskError};

/// Redis key prefix under which completed task ids are recorded.
pub const DEDUP_KEY_PREFIX: &str = "task:processed:";
