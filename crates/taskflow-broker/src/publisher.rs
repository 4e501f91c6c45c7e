use crate::{connection::declare_topology, BrokerError, Topology};
use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    publisher_confirm::Confirmation,
    BasicProperties, Channel, Connection,
};
use tracing::debug;

/// Durable publish operations the pipeline and the producer depend on.
///
/// A publish is not complete until the broker confirms it; implementations
/// must not report success on a mere TCP write.
#[async_trait]
pub trait TaskPublisher: Send + Sync {
    /// Publish an encoded envelope to the main task queue.
    async fn publish_task(&self, body: &[u8], message_id: &str) -> Result<(), BrokerError>;

    /// Publish an encoded envelope to the dead letter exchange.
    async fn publish_dead_letter(&self, body: &[u8], message_id: &str) -> Result<(), BrokerError>;
}

/// Publisher over a confirm-mode AMQP channel.
pub struct AmqpPublisher {
    channel: Channel,
    topology: Topology,
}

impl AmqpPublisher {
    pub async fn new(connection: &Connection, topology: Topology) -> Result<Self, BrokerError> {
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        declare_topology(&channel, &topology).await?;

        Ok(AmqpPublisher { channel, topology })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        message_id: &str,
    ) -> Result<(), BrokerError> {
        let properties = BasicProperties::default()
            .with_delivery_mode(2) // persistent
            .with_content_type("application/json".into())
            .with_message_id(message_id.into());

        let confirmation = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await?
            .await?;

        if let Confirmation::Nack(_) = confirmation {
            return Err(BrokerError::PublishNotConfirmed);
        }

        debug!(exchange, routing_key, message_id, "Publish confirmed");
        Ok(())
    }
}

#[async_trait]
impl TaskPublisher for AmqpPublisher {
    async fn publish_task(&self, body: &[u8], message_id: &str) -> Result<(), BrokerError> {
        self.publish(
            &self.topology.exchange,
            &self.topology.routing_key,
            body,
            message_id,
        )
        .await
    }

    async fn publish_dead_letter(&self, body: &[u8], message_id: &str) -> Result<(), BrokerError> {
        self.publish(&self.topology.dlq_exchange, "", body, message_id)
            .await
    }
}
