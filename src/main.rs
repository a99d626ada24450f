//! # Stepline
//!
//! Entry point of the step-pipeline server.
//!
//! ## Startup Sequence
//!
//! 1. **Tracing** - `RUST_LOG` or the built-in filter
//! 2. **Configuration** - defaults, then `--config`, then `STEPLINE_*`
//!    environment variables, then `--bind`
//! 3. **Engine and store** - built from the configuration
//! 4. **Axum API** - served until Ctrl+C

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use stepline_web::WebConfig;

use crate::cli::Cli;

const DEFAULT_FILTER: &str = "info,stepline_web=debug,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    info!(
        bind = %config.bind_address,
        app = %config.app_name,
        "Stepline starting"
    );

    stepline_web::run_server(&config, wait_for_shutdown())
        .await
        .with_context(|| format!("Server on {} failed", config.bind_address))?;

    info!("Stepline stopped gracefully");
    Ok(())
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Layer file, environment and flags over the defaults.
fn resolve_config(cli: &Cli) -> Result<WebConfig> {
    let config = match &cli.config {
        Some(path) => WebConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => WebConfig::default(),
    };

    let mut config = config
        .apply_env(|key| std::env::var(key).ok())
        .context("Invalid STEPLINE_* environment override")?;

    if let Some(bind) = &cli.bind {
        config.bind_address.clone_from(bind);
    }
    Ok(config)
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
