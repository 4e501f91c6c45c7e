use crate::{Result, TaskError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a logical task. Stable across retries.
pub type TaskId = Uuid;

/// The task message exchanged with the broker (JSON on the wire).
///
/// An envelope is immutable per delivery: a retry is a *new* envelope with
/// an incremented `attempt_count`, re-published as a new message, never an
/// in-place mutation of the delivered one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Assigned once at ingress; the dedup key is derived from it.
    pub task_id: TaskId,

    /// Handler discriminator (e.g., "send_email", "resize_image").
    pub task_type: String,

    /// Opaque handler-interpreted body.
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,

    /// Failed processing attempts so far. Carried in the message itself so
    /// a redelivery after a crash resumes from the correct count.
    #[serde(default)]
    pub attempt_count: u32,

    /// Set at ingress, immutable across retries.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Optional per-task override of the configured retry ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Terminal marker, present only on envelopes published to the dead
    /// letter queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl TaskEnvelope {
    /// Create a fresh envelope at attempt 0.
    pub fn new(
        task_type: impl Into<String>,
        payload: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        TaskEnvelope {
            task_id: Uuid::new_v4(),
            task_type: task_type.into(),
            payload,
            attempt_count: 0,
            created_at: Utc::now(),
            max_retries: None,
            failure_reason: None,
        }
    }

    pub fn with_task_id(mut self, task_id: TaskId) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Serialize to the JSON wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(TaskError::Encode)
    }

    /// Deserialize from the JSON wire form.
    ///
    /// Unknown extra fields are tolerated for forward compatibility; a
    /// missing `task_id` or `task_type` is an error, never defaulted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(TaskError::Decode)
    }

    /// The envelope for the next processing attempt.
    pub fn next_attempt(&self) -> Self {
        TaskEnvelope {
            attempt_count: self.attempt_count + 1,
            ..self.clone()
        }
    }

    /// The envelope as published to the dead letter queue: unchanged except
    /// for the terminal marker.
    pub fn into_dead_letter(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn payload(value: serde_json::Value) -> Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = TaskEnvelope::new(
            "send_email",
            payload(json!({
                "recipient": "user@example.com",
                "nested": { "a": [1, 2, { "b": null }] },
            })),
        );

        let bytes = envelope.to_bytes().unwrap();
        let decoded = TaskEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.attempt_count, 0);
    }

    #[test]
    fn test_roundtrip_preserves_retry_metadata() {
        let envelope = TaskEnvelope::new("fail_task", Map::new())
            .with_max_retries(5)
            .next_attempt()
            .next_attempt();

        let decoded = TaskEnvelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.attempt_count, 2);
        assert_eq!(decoded.max_retries, Some(5));
    }

    #[test]
    fn test_decode_rejects_missing_task_id() {
        let body = json!({ "task_type": "send_email", "payload": {} }).to_string();
        let result = TaskEnvelope::from_bytes(body.as_bytes());
        assert!(matches!(result, Err(TaskError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_missing_task_type() {
        let body = json!({ "task_id": Uuid::new_v4() }).to_string();
        let result = TaskEnvelope::from_bytes(body.as_bytes());
        assert!(matches!(result, Err(TaskError::Decode(_))));
    }

    #[test]
    fn test_decode_tolerates_unknown_fields() {
        let body = json!({
            "task_id": Uuid::new_v4(),
            "task_type": "send_email",
            "payload": { "recipient": "user@example.com" },
            "attempt_count": 1,
            "created_at": "2026-02-24T12:00:00Z",
            "trace_id": "added-by-a-newer-producer",
        })
        .to_string();

        let decoded = TaskEnvelope::from_bytes(body.as_bytes()).unwrap();
        assert_eq!(decoded.task_type, "send_email");
        assert_eq!(decoded.attempt_count, 1);
    }

    #[test]
    fn test_decode_defaults_attempt_count_and_payload() {
        let body = json!({
            "task_id": Uuid::new_v4(),
            "task_type": "resize_image",
        })
        .to_string();

        let decoded = TaskEnvelope::from_bytes(body.as_bytes()).unwrap();
        assert_eq!(decoded.attempt_count, 0);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_next_attempt_keeps_identity() {
        let envelope = TaskEnvelope::new("process_payment", Map::new());
        let retry = envelope.next_attempt();

        assert_eq!(retry.task_id, envelope.task_id);
        assert_eq!(retry.created_at, envelope.created_at);
        assert_eq!(retry.attempt_count, 1);
    }

    #[test]
    fn test_dead_letter_marker() {
        let envelope = TaskEnvelope::new("fail_task", Map::new());
        assert!(envelope.failure_reason.is_none());

        let dead = envelope.into_dead_letter("retries exhausted");
        assert_eq!(dead.failure_reason.as_deref(), Some("retries exhausted"));

        let decoded = TaskEnvelope::from_bytes(&dead.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.failure_reason.as_deref(), Some("retries exhausted"));
    }
}
