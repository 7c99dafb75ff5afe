// =============================================================================
// Trend Forecaster — Main Entry Point
// =============================================================================
//
// Loads `.env`, the JSON runtime config and FORECAST_* overrides, then hands
// off to the chosen subcommand: a one-shot forecast, the dashboard API, or
// the suggested-ticker list.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod cli;
mod error;
mod features;
mod indicators;
mod market_data;
mod model;
mod pipeline;
mod predictor;
mod runtime_config;
mod types;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::runtime_config::RuntimeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // ── 2. Config: defaults < file < environment ─────────────────────────
    let mut config = RuntimeConfig::load(&cli.config).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env();

    info!(
        provider = %config.provider,
        history_days = config.history_days,
        lookback = config.pipeline.lookback,
        epochs = config.pipeline.model.epochs,
        "Trend Forecaster starting"
    );

    // ── 3. Dispatch ──────────────────────────────────────────────────────
    match cli.command {
        Command::Forecast(args) => cli::forecast(config, args).await,
        Command::Serve { bind } => cli::serve(config, bind).await,
        Command::Suggest => {
            cli::suggest();
            Ok(())
        }
        Command::InitConfig => cli::init_config(&config, &cli.config),
    }
}
