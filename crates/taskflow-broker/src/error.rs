use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Broker rejected the publish (negative confirmation)")]
    PublishNotConfirmed,

    #[error("Broker closed the delivery stream")]
    DeliveryStreamClosed,

    #[error("Could not connect to broker after {attempts} attempts: {source}")]
    ConnectExhausted {
        attempts: u32,
        #[source]
        source: lapin::Error,
    },
}
