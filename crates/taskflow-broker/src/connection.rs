use crate::{BrokerConfig, BrokerError, Topology};
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable},
    Channel, Connection, ConnectionProperties, ExchangeKind,
};
use std::time::Duration;
use tracing::{info, warn};

const STARTUP_RETRY_ATTEMPTS: u32 = 10;
const STARTUP_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Connect to the broker, retrying on startup instead of crash-looping.
///
/// Container orchestration commonly starts the worker before the broker is
/// accepting connections; a bounded retry loop rides that out.
pub async fn connect_with_retry(config: &BrokerConfig) -> Result<Connection, BrokerError> {
    let uri = config.amqp_uri();

    for attempt in 1..=STARTUP_RETRY_ATTEMPTS {
        info!(host = %config.host, port = config.port, attempt, "Connecting to broker");

        match Connection::connect(&uri, ConnectionProperties::default()).await {
            Ok(connection) => {
                info!(host = %config.host, "Connected to broker");
                return Ok(connection);
            }
            Err(e) if attempt < STARTUP_RETRY_ATTEMPTS => {
                warn!(
                    attempt,
                    error = %e,
                    retry_in_secs = STARTUP_RETRY_DELAY.as_secs(),
                    "Broker not available yet, retrying"
                );
                tokio::time::sleep(STARTUP_RETRY_DELAY).await;
            }
            Err(e) => {
                return Err(BrokerError::ConnectExhausted {
                    attempts: STARTUP_RETRY_ATTEMPTS,
                    source: e,
                });
            }
        }
    }

    unreachable!("startup retry loop always returns");
}

/// Idempotently declare the queue topology.
///
/// Producer and worker both call this with the same names so either side can
/// start first: DLX (fanout) and its queue, the main direct exchange, and
/// the main queue dead-lettering into the DLX.
pub async fn declare_topology(channel: &Channel, topology: &Topology) -> Result<(), BrokerError> {
    let durable = ExchangeDeclareOptions {
        durable: true,
        ..Default::default()
    };
    let durable_queue = QueueDeclareOptions {
        durable: true,
        ..Default::default()
    };

    channel
        .exchange_declare(
            &topology.dlq_exchange,
            ExchangeKind::Fanout,
            durable,
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_declare(&topology.dlq_queue, durable_queue, FieldTable::default())
        .await?;
    channel
        .queue_bind(
            &topology.dlq_queue,
            &topology.dlq_exchange,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    channel
        .exchange_declare(
            &topology.exchange,
            ExchangeKind::Direct,
            durable,
            FieldTable::default(),
        )
        .await?;

    let mut arguments = FieldTable::default();
    arguments.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(topology.dlq_exchange.as_str().into()),
    );
    channel
        .queue_declare(&topology.task_queue, durable_queue, arguments)
        .await?;
    channel
        .queue_bind(
            &topology.task_queue,
            &topology.exchange,
            &topology.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    Ok(())
}
