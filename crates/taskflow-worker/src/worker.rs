use crate::config::WorkerConfig;
use crate::dedup::RedisDedupStore;
use crate::handler::TaskHandlerRegistry;
use crate::pipeline::{Pipeline, PipelineConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskflow_broker::{connect_with_retry, AmqpPublisher, BrokerError, TaskConsumer};
use taskflow_core::BackoffPolicy;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Shutdown signal shared between the worker and its signal handler.
///
/// The flag is sticky: consumers exiting with the flag set is an operator
/// stop, consumers exiting without it means the broker connection died and
/// the worker must reconnect.
pub struct Shutdown {
    notify: Notify,
    requested: AtomicBool,
}

impl Shutdown {
    fn new() -> Self {
        Shutdown {
            notify: Notify::new(),
            requested: AtomicBool::new(false),
        }
    }

    /// Request a graceful stop; consumers finish their in-flight delivery.
    pub fn signal(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn notify(&self) -> &Notify {
        &self.notify
    }
}

/// Worker process: N independent consumers competing on the task queue,
/// each running the processing pipeline one delivery at a time.
pub struct Worker {
    config: WorkerConfig,
    worker_id: String,
    registry: Arc<TaskHandlerRegistry>,
    shutdown: Arc<Shutdown>,
}

impl Worker {
    pub fn new(config: WorkerConfig, registry: TaskHandlerRegistry) -> Self {
        let worker_id = config.generate_worker_id();

        Worker {
            config,
            worker_id,
            registry: Arc::new(registry),
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Handle for signal handlers; `signal` stops all consumers after
    /// their in-flight delivery settles.
    pub fn shutdown_handle(&self) -> Arc<Shutdown> {
        self.shutdown.clone()
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        info!(
            worker_id = %self.worker_id,
            concurrency = self.config.concurrency,
            "Starting worker"
        );

        // The redis ConnectionManager reconnects on its own; only the AMQP
        // session is rebuilt per reconnect.
        let dedup = Arc::new(RedisDedupStore::new(&self.config.redis_url).await?);
        let topology = self.config.broker.topology.clone();

        loop {
            let connection = connect_with_retry(&self.config.broker).await?;

            let publisher = Arc::new(AmqpPublisher::new(&connection, topology.clone()).await?);
            let pipeline = Arc::new(Pipeline::new(
                self.registry.clone(),
                dedup.clone(),
                publisher,
                PipelineConfig {
                    backoff: BackoffPolicy::new(
                        self.config.max_retries,
                        self.config.retry_base_delay_secs,
                    ),
                    dedup_ttl: Duration::from_secs(self.config.dedup_ttl_secs),
                    task_timeout: Duration::from_secs(self.config.task_timeout_secs),
                    dedup_failure_policy: self.config.dedup_failure_policy,
                },
            ));

            let mut consumers = Vec::with_capacity(self.config.concurrency);
            for i in 0..self.config.concurrency {
                let consumer = TaskConsumer::new(&connection, &topology).await?;
                let consumer_tag = format!("{}-{}", self.worker_id, i);
                let pipeline = pipeline.clone();
                let shutdown = self.shutdown.clone();

                consumers.push(tokio::spawn(async move {
                    consumer
                        .run(&consumer_tag, pipeline.as_ref(), shutdown.notify())
                        .await
                }));
            }

            info!(
                queue = %topology.task_queue,
                max_retries = self.config.max_retries,
                retry_base_delay_secs = self.config.retry_base_delay_secs,
                "Worker ready, waiting for tasks"
            );

            join_consumers(consumers).await?;

            if self.shutdown.is_requested() {
                break;
            }

            // Not a shutdown: the connection is gone. Re-enter the startup
            // retry loop rather than exiting with success.
            warn!("Broker connection lost, reconnecting");
        }

        info!(worker_id = %self.worker_id, "Worker stopped");
        Ok(())
    }
}

/// Wait for all consumers of one broker session to finish, logging any
/// that stopped with an error.
async fn join_consumers(
    consumers: Vec<JoinHandle<Result<(), BrokerError>>>,
) -> anyhow::Result<bool> {
    let mut any_failed = false;
    for consumer in consumers {
        if let Err(e) = consumer.await? {
            error!(error = %e, "Consumer stopped with error");
            any_failed = true;
        }
    }
    Ok(any_failed)
}
