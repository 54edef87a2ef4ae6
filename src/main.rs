//! Callout server with streaming body buffering.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                 CALLOUT SERVER                   │
//!                         │                                                  │
//!   proxy connection      │  ┌─────────┐   ┌─────────┐   ┌───────────────┐   │
//!   ──────────────────────┼─▶│   net   │──▶│ session │──▶│   processor   │   │
//!   (framed phase events) │  │ server  │   │per stream│  │ state machine │   │
//!                         │  └─────────┘   └────┬────┘   └──────┬────────┘   │
//!                         │                     │               │            │
//!                         │              correlator      ┌──────▼───────┐    │
//!                         │                     │        │ mutation     │    │
//!                         │                     ▼        │ builder      │    │
//!                         │              ┌─────────────┐ └──────────────┘    │
//!                         │              │ transaction │◀── reclaim sweeper  │
//!                         │              │    store    │                     │
//!                         │              └─────────────┘                     │
//!   phase responses       │                                                  │
//!   ◀─────────────────────┼── one response per event, mutation attached     │
//!                         └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use callout_buffering::config::{load_config, validate_config, CalloutConfig, ConfigError};
use callout_buffering::lifecycle::{wait_for_signal, Shutdown};
use callout_buffering::net::{CalloutServer, Listener};
use callout_buffering::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "callout-buffering")]
#[command(about = "External-processing callout server with body buffering", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => CalloutConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "callout-buffering starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_body_bytes = config.buffering.max_body_bytes,
        idle_timeout_secs = config.buffering.idle_timeout_secs,
        overflow_policy = ?config.buffering.overflow_policy,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = Listener::bind(&config.listener).await?;
    let shutdown = Shutdown::new();
    let server = CalloutServer::new(config);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await?;
    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
