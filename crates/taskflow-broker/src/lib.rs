pub mod config;
pub mod connection;
pub mod consumer;
mod error;
pub mod publisher;

pub use config::{BrokerConfig, Topology};
pub use connection::{connect_with_retry, declare_topology};
pub use consumer::{AckDecision, DeliveryHandler, TaskConsumer};
pub use error::BrokerError;
pub use publisher::{AmqpPublisher, TaskPublisher};
