//! Bucket Gateway - REST front end for S3-compatible storage

use bucketgate_cli::{run_server, GatewayConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "bucketgate-gateway")]
#[command(about = "REST gateway for bucket and object operations on S3-compatible storage")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, default_value = "config.yaml", env = "BUCKETGATE_CONFIG")]
    config: PathBuf,

    /// Host to bind to (overrides the configuration file)
    #[arg(short = 'H', long, env = "BUCKETGATE_HOST")]
    host: Option<String>,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long, env = "BUCKETGATE_PORT")]
    port: Option<u16>,

    /// Use in-memory storage (for testing, data will not persist)
    #[arg(long, env = "BUCKETGATE_MEMORY_STORE")]
    memory_store: bool,

    /// Enable debug logging
    #[arg(short, long, env = "BUCKETGATE_DEBUG")]
    debug: bool,

    /// Do not capture request bodies in the access log
    #[arg(long, env = "BUCKETGATE_NO_BODY_LOGGING")]
    no_body_logging: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("bucketgate_cli={},tower_http=debug", log_level).into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = GatewayConfig::load(&args.config)?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.memory_store {
        config.use_memory_store = true;
    }
    if args.no_body_logging {
        config.access_log.log_body = false;
    }

    tracing::info!(
        "Starting bucket gateway on {} (config: {})",
        config.bind_addr(),
        args.config.display()
    );
    if config.use_memory_store {
        tracing::warn!("Using in-memory storage - data will NOT persist!");
    }

    run_server(config).await
}
