//! simtelemetryd - simracing telemetry collector

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use simracing_telemetry_service::{ServiceConfig, TelemetryService};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "simracing_telemetry=info,info";

#[derive(Parser)]
#[command(name = "simtelemetryd")]
#[command(about = "Receive simracing UDP telemetry and fan it out to files, SQLite and relays")]
#[command(version)]
struct Cli {
    /// Configuration file (YAML, or JSON with a .json extension)
    #[arg(long, env = "SIMTELEMETRY_CONFIG")]
    config: PathBuf,

    /// Log filter directives, overrides RUST_LOG
    #[arg(long)]
    log_filter: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

fn init_logging(log_filter: Option<&str>) {
    let filter = match log_filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_filter.as_deref());

    info!("Starting simtelemetryd v{}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::load_from_path(&cli.config).await?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", cli.config.display()))?;

    if cli.check {
        info!(endpoints = config.endpoints.len(), "configuration is valid");
        return Ok(());
    }

    let service = TelemetryService::start(&config).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    let reports = service.shutdown().await;
    info!(endpoints = reports.len(), "simtelemetryd stopped");
    Ok(())
}
