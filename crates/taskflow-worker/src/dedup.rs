use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;
use taskflow_core::{TaskId, DEDUP_KEY_PREFIX};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DedupError {
    /// Connectivity failure. Deliberately distinct from "not completed":
    /// the pipeline applies its configured fail-safe policy instead of
    /// guessing.
    #[error("Dedup store unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),
}

/// Expiring record of successfully completed task ids.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Has this logical task already completed successfully?
    async fn has_completed(&self, task_id: TaskId) -> Result<bool, DedupError>;

    /// Record a successful completion. Idempotent: marking twice is a
    /// harmless overwrite, never an error.
    async fn mark_completed(&self, task_id: TaskId, ttl: Duration) -> Result<(), DedupError>;
}

/// Redis-backed dedup store, key `task:processed:<task_id>`.
pub struct RedisDedupStore {
    conn: ConnectionManager,
}

impl RedisDedupStore {
    pub async fn new(redis_url: &str) -> Result<Self, DedupError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(RedisDedupStore { conn })
    }

    fn key(task_id: TaskId) -> String {
        format!("{}{}", DEDUP_KEY_PREFIX, task_id)
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn has_completed(&self, task_id: TaskId) -> Result<bool, DedupError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(Self::key(task_id)).await?;
        Ok(exists)
    }

    async fn mark_completed(&self, task_id: TaskId, ttl: Duration) -> Result<(), DedupError> {
        let mut conn = self.conn.clone();
        let () = conn
            .set_ex(Self::key(task_id), "processed", ttl.as_secs())
            .await?;
        debug!(%task_id, ttl_secs = ttl.as_secs(), "Recorded task completion");
        Ok(())
    }
}
