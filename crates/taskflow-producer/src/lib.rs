pub mod api;
pub mod config;

pub use api::create_router;
pub use config::ProducerConfig;
