// =============================================================================
// Command-line interface
// =============================================================================
//
//   trend-forecaster forecast AAPL --days 1000 --epochs 50 --amount 2500
//   trend-forecaster serve --bind 127.0.0.1:3001
//   trend-forecaster suggest
//   trend-forecaster init-config --config my_forecast.json
//
// Flags override the config file and FORECAST_* environment for one
// invocation only; nothing is written back.
// =============================================================================

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::market_data::MarketDataProvider;
use crate::pipeline::{Pipeline, PipelineEvent};
use crate::predictor::{PredictionResult, SUGGESTED_TICKERS};
use crate::runtime_config::{RuntimeConfig, DEFAULT_CONFIG_PATH};
use crate::types::{DateRange, ProviderKind};

#[derive(Parser, Debug)]
#[command(name = "trend-forecaster")]
#[command(about = "LSTM next-day and quarter-trend forecasts from daily OHLCV data", long_about = None)]
pub struct Cli {
    /// Path of the JSON config file.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train on one ticker and print the forecast.
    Forecast(ForecastArgs),
    /// Start the dashboard HTTP API.
    Serve {
        /// Listen address, e.g. 0.0.0.0:3001
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// List suggested tickers.
    Suggest,
    /// Write the effective configuration (defaults, file, environment) to the config path.
    InitConfig,
}

#[derive(Args, Debug)]
pub struct ForecastArgs {
    /// Ticker symbol (AAPL, PETR4.SA, BTCUSDT, ...).
    pub ticker: String,

    /// Market data source.
    #[arg(short, long, value_enum)]
    pub provider: Option<ProviderKind>,

    /// Calendar days of history to fetch.
    #[arg(short, long)]
    pub days: Option<u32>,

    /// Training epochs.
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// RNG seed for reproducible training.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Investment amount for the calculator.
    #[arg(short, long, default_value = "1000")]
    pub amount: f64,
}

impl ForecastArgs {
    /// Layer the flags on top of `config`.
    pub fn apply(&self, config: &mut RuntimeConfig) {
        if let Some(p) = self.provider {
            config.provider = p;
        }
        if let Some(d) = self.days {
            config.history_days = d;
        }
        if let Some(e) = self.epochs {
            config.pipeline.model.epochs = e;
        }
        if let Some(s) = self.seed {
            config.pipeline.model.seed = Some(s);
        }
    }
}

// =============================================================================
// Subcommands
// =============================================================================

pub async fn forecast(mut config: RuntimeConfig, args: ForecastArgs) -> Result<()> {
    args.apply(&mut config);
    let ticker = args.ticker.trim().to_uppercase();
    anyhow::ensure!(!ticker.is_empty(), "ticker must not be empty");

    let provider = MarketDataProvider::new(config.provider)?;
    let range = DateRange::last_days(config.history_days);

    let (tx, mut rx) = unbounded_channel();
    let pipeline = Pipeline::new(config.pipeline.clone()).with_events(tx);

    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling at the next epoch");
            cancel.cancel();
        }
    });

    let logger = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::StageEntered { stage } => info!(%stage, "stage"),
                PipelineEvent::CandlesLoaded { candles } => {
                    info!(candles = candles.len(), "history loaded")
                }
                PipelineEvent::Epoch(p) => {
                    info!(epoch = p.epoch + 1, epochs = p.epochs, loss = p.loss, "epoch")
                }
                PipelineEvent::Completed(_) | PipelineEvent::Failed { .. } => {}
            }
        }
    });

    let outcome = pipeline.run(&provider, &ticker, &range).await;
    drop(pipeline);
    let _ = logger.await;

    let result = outcome.with_context(|| format!("forecast for {ticker} failed"))?;
    print!("{}", render_report(&ticker, &result, args.amount));
    Ok(())
}

pub async fn serve(mut config: RuntimeConfig, bind: Option<String>) -> Result<()> {
    if let Some(addr) = bind {
        config.bind_addr = addr;
    }
    let bind_addr = config.bind_addr.clone();

    let state = Arc::new(AppState::new(config));
    let app = crate::api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "dashboard API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("HTTP server failed")
}

pub fn suggest() {
    print!("{}", render_suggestions());
}

pub fn init_config(config: &RuntimeConfig, path: &Path) -> Result<()> {
    config.save(path)?;
    println!("wrote {}", path.display());
    Ok(())
}

// =============================================================================
// Rendering
// =============================================================================

pub fn render_report(ticker: &str, result: &PredictionResult, amount: f64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n== {ticker} ==");
    let _ = writeln!(out, "Last close:            {:>12.2}", result.last_close);
    let _ = writeln!(out, "Next-day forecast:     {:>12.2}", result.next_day_value);
    let _ = writeln!(
        out,
        "Next-day change:       {:>11.2}%",
        result.next_day_change * 100.0
    );
    let _ = writeln!(
        out,
        "3-month projection:    {:>12.2}",
        result.three_month_projection
    );
    let _ = writeln!(out, "\n{}\n", result.explanation(ticker));

    let _ = writeln!(out, "Features used (latest day):");
    for (name, value) in result.labelled_features() {
        let _ = writeln!(out, "  {name:<8} {value:>16.4}");
    }

    let projection = result.project_investment(amount);
    let _ = writeln!(out, "\nInvestment of {:.2}:", projection.amount);
    let _ = writeln!(out, "  next day   {:>14.2}", projection.next_day_value);
    let _ = writeln!(out, "  3 months   {:>14.2}", projection.three_month_value);
    out
}

pub fn render_suggestions() -> String {
    let mut out = String::from("Suggested tickers:\n");
    for (symbol, name) in SUGGESTED_TICKERS {
        let _ = writeln!(out, "  {symbol:<6} {name}");
    }
    out
}
