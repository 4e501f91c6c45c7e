pub mod config;
pub mod dedup;
pub mod executor;
pub mod handler;
pub mod handlers;
pub mod pipeline;
pub mod worker;

pub use config::{DedupFailurePolicy, WorkerConfig};
pub use dedup::{DedupError, DedupStore, RedisDedupStore};
pub use handler::{TaskHandler, TaskHandlerRegistry};
pub use pipeline::{Pipeline, PipelineConfig};
pub use worker::{Shutdown, Worker};
