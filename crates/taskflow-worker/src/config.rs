use serde::{Deserialize, Serialize};
use std::str::FromStr;
use taskflow_broker::{config::env_or, BrokerConfig};

/// Fail-safe behavior when the dedup store cannot be reached during the
/// dedup check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupFailurePolicy {
    /// Negative-acknowledge and let the broker redeliver. Prefers possible
    /// duplicate processing over silent task loss.
    Requeue,
    /// Treat the task as not yet completed and dispatch anyway. Prefers
    /// availability over duplicate suppression.
    Proceed,
}

impl FromStr for DedupFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "requeue" => Ok(DedupFailurePolicy::Requeue),
            "proceed" => Ok(DedupFailurePolicy::Proceed),
            other => Err(format!("unknown dedup failure policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub broker: BrokerConfig,
    pub redis_url: String,
    /// How long a completed task id is remembered, in seconds.
    pub dedup_ttl_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_secs: f64,
    /// Per-task execution ceiling; expiry counts as a transient failure.
    pub task_timeout_secs: u64,
    /// Number of consumers competing on the task queue (prefetch=1 each).
    pub concurrency: usize,
    pub dedup_failure_policy: DedupFailurePolicy,
    pub worker_id: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            broker: BrokerConfig::default(),
            redis_url: "redis://localhost:6379/0".to_string(),
            dedup_ttl_secs: 86400,
            max_retries: 3,
            retry_base_delay_secs: 2.0,
            task_timeout_secs: 300,
            concurrency: 1,
            dedup_failure_policy: DedupFailurePolicy::Requeue,
            worker_id: None,
        }
    }
}

impl WorkerConfig {
    /// Read settings from the environment; every variable has a default, so
    /// an empty environment yields a working local configuration.
    pub fn from_env() -> Self {
        let defaults = WorkerConfig::default();

        WorkerConfig {
            broker: BrokerConfig::from_env(),
            redis_url: env_or("REDIS_URL", defaults.redis_url),
            dedup_ttl_secs: env_or("DEDUP_TTL_SECS", defaults.dedup_ttl_secs),
            max_retries: env_or("MAX_RETRIES", defaults.max_retries),
            retry_base_delay_secs: env_or("RETRY_BASE_DELAY_SECS", defaults.retry_base_delay_secs),
            task_timeout_secs: env_or("TASK_TIMEOUT_SECS", defaults.task_timeout_secs),
            concurrency: env_or("WORKER_CONCURRENCY", defaults.concurrency),
            dedup_failure_policy: env_or(
                "DEDUP_FAILURE_POLICY",
                defaults.dedup_failure_policy,
            ),
            worker_id: std::env::var("WORKER_ID").ok(),
        }
    }

    /// Stable-enough identity for consumer tags and logs.
    pub fn generate_worker_id(&self) -> String {
        if let Some(id) = &self.worker_id {
            return id.clone();
        }

        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        let pid = std::process::id();
        let random = uuid::Uuid::new_v4()
            .to_string()
            .split('-')
            .next()
            .unwrap()
            .to_string();

        format!("{}-{}-{}", host, pid, random)
    }
}
