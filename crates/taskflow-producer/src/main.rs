use clap::Parser;
use std::sync::Arc;
use taskflow_broker::{connect_with_retry, AmqpPublisher};
use taskflow_producer::{create_router, ProducerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tf-producer")]
#[command(about = "Task ingress HTTP API", long_about = None)]
struct Args {
    /// HTTP listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = ProducerConfig::from_env();
    if let Some(port) = args.port {
        config.http_port = port;
    }

    let connection = connect_with_retry(&config.broker).await?;
    let publisher = Arc::new(AmqpPublisher::new(&connection, config.broker.topology.clone()).await?);

    let app = create_router(publisher);
    let addr = format!("0.0.0.0:{}", config.http_port);
    tracing::info!(addr = %addr, "Producer API listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
