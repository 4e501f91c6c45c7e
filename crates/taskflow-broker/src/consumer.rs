use crate::{connection::declare_topology, BrokerError, Topology};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::FieldTable,
    Channel, Connection,
};
use tokio::sync::Notify;
use tracing::{info, warn};

/// How the consumer should settle the delivery it just handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    Ack,
    Nack { requeue: bool },
}

/// Callback invoked once per delivery; the consumer performs the returned
/// acknowledgment exactly once.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, body: &[u8]) -> AckDecision;
}

/// One consumer on the main task queue.
///
/// Each consumer runs on its own channel with `prefetch_count = 1` and
/// manual acknowledgment: one unacked delivery in flight at a time, handled
/// synchronously end to end. Concurrency comes from running several
/// consumers competing on the same queue, never from overlapping work on
/// one channel.
pub struct TaskConsumer {
    channel: Channel,
    queue: String,
}

impl TaskConsumer {
    pub async fn new(connection: &Connection, topology: &Topology) -> Result<Self, BrokerError> {
        let channel = connection.create_channel().await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;
        declare_topology(&channel, topology).await?;

        Ok(TaskConsumer {
            channel,
            queue: topology.task_queue.clone(),
        })
    }

    /// Consume until `shutdown` fires.
    ///
    /// A shutdown signal is only observed between deliveries, so the
    /// in-flight task always settles before the loop exits. The stream
    /// ending any other way is a connection failure and returns `Err`, so
    /// the caller can reconnect instead of treating it as a clean stop.
    pub async fn run<H: DeliveryHandler>(
        &self,
        consumer_tag: &str,
        handler: &H,
        shutdown: &Notify,
    ) -> Result<(), BrokerError> {
        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue = %self.queue, consumer_tag, "Consumer started");

        // Register for shutdown before the loop so a notify_waiters fired
        // while a delivery is being handled is not lost.
        let shutdown = shutdown.notified();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                next = consumer.next() => {
                    let Some(delivery) = next else {
                        warn!(consumer_tag, "Delivery stream closed by broker");
                        return Err(BrokerError::DeliveryStreamClosed);
                    };
                    let delivery = delivery?;

                    match handler.handle(&delivery.data).await {
                        AckDecision::Ack => {
                            delivery.ack(BasicAckOptions::default()).await?;
                        }
                        AckDecision::Nack { requeue } => {
                            delivery
                                .nack(BasicNackOptions {
                                    requeue,
                                    ..Default::default()
                                })
                                .await?;
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!(consumer_tag, "Consumer shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
