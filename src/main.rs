//! replica: one port, two protocols.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                   BROKER                     │
//!   TCP connection       │  ┌─────────┐   ┌───────┐   ┌──────────────┐  │
//!   ─────────────────────┼─▶│listener │──▶│ sniff │──▶│    demux     │  │
//!                        │  └─────────┘   └───────┘   └──┬────────┬──┘  │
//!                        │                    HTTP       │        │ raw │
//!                        │                   ┌───────────▼─┐  ┌───▼───┐ │
//!   POST /publish ───────┼──────────────────▶│ axum server │  │session│◀┼── topic\n
//!                        │                   └──────┬──────┘  └───┬───┘ │
//!                        │                          ▼             ▼     │
//!                        │                   ┌──────────────────────┐   │
//!                        │                   │    TopicRegistry     │───┼──▶ message\n
//!                        │                   └──────────────────────┘   │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use replica::config::{self, validation::validate_config, BrokerConfig, ConfigError};
use replica::lifecycle::{self, signals};
use replica::net::DemuxError;
use replica::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "replica")]
#[command(about = "Pub/sub broker sharing one port between HTTP publishers and line-protocol subscribers", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

fn load(cli: &Cli) -> Result<BrokerConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => BrokerConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
        validate_config(&config).map_err(ConfigError::Validation)?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    logging::init(&config.observability.log_level);
    tracing::info!("replica v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        sniff_window = config.sniff.window_bytes,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let broker = lifecycle::start(&config).await?;

    let failure = tokio::select! {
        _ = signals::wait_for_signal() => None,
        reason = broker.closed() => Some(reason),
    };
    broker.stop().await;

    match failure {
        Some(DemuxError::Accept(e)) => {
            tracing::error!(error = %e, "Listener failed");
            Err(DemuxError::Accept(e).into())
        }
        _ => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
    }
}
