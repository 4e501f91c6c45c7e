use clap::Parser;
use taskflow_worker::{handlers, TaskHandlerRegistry, Worker, WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tf-worker")]
#[command(about = "Durable task worker", long_about = None)]
struct Args {
    /// Number of concurrent consumers (prefetch=1 each)
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Worker ID (auto-generated if not provided)
    #[arg(long)]
    worker_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Absence of a .env file is fine; the environment still applies.
    dotenvy::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = WorkerConfig::from_env();
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(worker_id) = args.worker_id {
        config.worker_id = Some(worker_id);
    }

    let registry = TaskHandlerRegistry::new();
    handlers::register_builtin(&registry);
    tracing::info!("Registered task types: {:?}", registry.task_types());

    let worker = Worker::new(config, registry);

    let shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        shutdown.signal();
    });

    worker.run().await?;

    Ok(())
}
