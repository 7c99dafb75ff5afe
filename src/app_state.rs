// =============================================================================
// Central Application State — Forecast Dashboard
// =============================================================================
//
// The single source of truth for the HTTP dashboard. Holds the runtime config
// and the one forecasting session that may be in flight. Pipeline events are
// folded into the session as they arrive; the REST layer only ever reads a
// serialisable snapshot.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for the session and config.
//
// Only one run at a time. Starting a run wipes the previous candles, epoch
// log, result and error, so a failure is never displayed next to a stale
// forecast.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{info, warn};
use uuid::Uuid;

use crate::market_data::{Candle, MarketDataProvider};
use crate::pipeline::{CancelToken, EpochProgress, Pipeline, PipelineEvent, Stage};
use crate::predictor::PredictionResult;
use crate::runtime_config::RuntimeConfig;
use crate::types::{DateRange, ProviderKind};

// =============================================================================
// Session
// =============================================================================

/// Everything the dashboard shows about the current (or last) run.
#[derive(Debug, Clone)]
struct Session {
    run_id: Option<Uuid>,
    ticker: Option<String>,
    provider: Option<ProviderKind>,
    stage: Stage,
    status_message: String,
    candles: Vec<Candle>,
    epoch_log: Vec<EpochProgress>,
    result: Option<PredictionResult>,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            run_id: None,
            ticker: None,
            provider: None,
            stage: Stage::Idle,
            status_message: "Enter a ticker to start.".to_string(),
            candles: Vec::new(),
            epoch_log: Vec::new(),
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Why a new run could not be started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunRejected {
    /// Another run is still in progress.
    Busy { ticker: String },
    /// The ticker was blank.
    EmptyTicker,
}

// =============================================================================
// AppState
// =============================================================================

/// Shared across all handlers via `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter. Incremented on every
    /// meaningful state mutation.
    pub state_version: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    session: RwLock<Session>,

    /// Cancel handle of the run in flight, if any.
    cancel: RwLock<Option<CancelToken>>,

    /// Instant when the server was started. Used for uptime calculations.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            state_version: AtomicU64::new(1),
            runtime_config: Arc::new(RwLock::new(config)),
            session: RwLock::new(Session::default()),
            cancel: RwLock::new(None),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Tracking ────────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Run Lifecycle ───────────────────────────────────────────────────

    /// Reserve the session for a new run on `ticker`.
    ///
    /// Clears every trace of the previous run and hands back the run id plus
    /// the cancel token the pipeline must use.
    pub fn begin_run(
        &self,
        ticker: &str,
        provider: ProviderKind,
    ) -> Result<(Uuid, CancelToken), RunRejected> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(RunRejected::EmptyTicker);
        }

        let mut session = self.session.write();
        if session.stage.is_running() {
            return Err(RunRejected::Busy {
                ticker: session.ticker.clone().unwrap_or_default(),
            });
        }

        let run_id = Uuid::new_v4();
        let token = CancelToken::new();
        *session = Session {
            run_id: Some(run_id),
            status_message: format!("Fetching data for {ticker}..."),
            ticker: Some(ticker),
            provider: Some(provider),
            stage: Stage::Fetching,
            started_at: Some(Utc::now()),
            ..Session::default()
        };
        *self.cancel.write() = Some(token.clone());
        drop(session);

        self.increment_version();
        Ok((run_id, token))
    }

    /// Fold one pipeline event into the session. Events from a run other
    /// than the current one are dropped.
    pub fn apply_event(&self, run_id: Uuid, event: &PipelineEvent) {
        let mut session = self.session.write();
        if session.run_id != Some(run_id) {
            return;
        }
        let ticker = session.ticker.clone().unwrap_or_default();

        match event {
            PipelineEvent::StageEntered { stage } => {
                session.stage = *stage;
                session.status_message = match stage {
                    Stage::Fetching => format!("Fetching data for {ticker}..."),
                    Stage::Training => "Training model... this can take a moment.".to_string(),
                    other => format!("{ticker}: {other}..."),
                };
            }
            PipelineEvent::CandlesLoaded { candles } => {
                session.candles = candles.clone();
                session.status_message =
                    format!("Loaded {} daily candles for {ticker}.", candles.len());
            }
            PipelineEvent::Epoch(progress) => {
                session.epoch_log.push(*progress);
            }
            PipelineEvent::Completed(result) => {
                session.stage = Stage::Done;
                session.result = Some(result.clone());
                session.error = None;
                session.finished_at = Some(Utc::now());
                session.status_message = format!("Forecast for {ticker} complete.");
            }
            PipelineEvent::Failed { message } => {
                session.stage = Stage::Failed;
                session.result = None;
                session.error = Some(message.clone());
                session.finished_at = Some(Utc::now());
                session.status_message = format!("Error: {message}");
            }
        }

        if session.stage.is_terminal() {
            *self.cancel.write() = None;
        }
        drop(session);
        self.increment_version();
    }

    /// Fire the cancel token of the run in flight. Returns `false` when
    /// nothing is running.
    pub fn cancel_run(&self) -> bool {
        match self.cancel.read().as_ref() {
            Some(token) => {
                token.cancel();
                info!("run cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn latest_result(&self) -> Option<PredictionResult> {
        self.session.read().result.clone()
    }

    /// Reserve the session and run the pipeline in the background.
    ///
    /// Events are forwarded into the session by a companion task.
    pub fn launch_run(
        self: &Arc<Self>,
        ticker: &str,
        provider: Option<ProviderKind>,
    ) -> Result<Uuid, RunRejected> {
        let (pipeline_config, provider, history_days) = {
            let config = self.runtime_config.read();
            (
                config.pipeline.clone(),
                provider.unwrap_or(config.provider),
                config.history_days,
            )
        };

        let (run_id, cancel) = self.begin_run(ticker, provider)?;
        let ticker = self
            .session
            .read()
            .ticker
            .clone()
            .unwrap_or_default();

        let (tx, mut rx) = unbounded_channel();
        let pipeline = Pipeline::new(pipeline_config)
            .with_events(tx)
            .with_cancel(cancel);

        let state = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                state.apply_event(run_id, &event);
            }
        });

        let state = Arc::clone(self);
        tokio::spawn(async move {
            let source = match MarketDataProvider::new(provider) {
                Ok(source) => source,
                Err(e) => {
                    warn!(error = %e, "provider setup failed");
                    state.apply_event(
                        run_id,
                        &PipelineEvent::Failed {
                            message: format!("{e:#}"),
                        },
                    );
                    return;
                }
            };
            let range = DateRange::last_days(history_days);
            if let Err(e) = pipeline.run(&source, &ticker, &range).await {
                info!(%ticker, error = %e, "run ended without a forecast");
            }
        });

        info!(%run_id, provider = %provider, "analysis started");
        Ok(run_id)
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Serialisable view served by `GET /api/v1/state`.
    pub fn build_snapshot(&self) -> StateSnapshot {
        let session = self.session.read().clone();
        let explanation = match (&session.result, &session.ticker) {
            (Some(result), Some(ticker)) => Some(result.explanation(ticker)),
            _ => None,
        };

        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            run_id: session.run_id,
            ticker: session.ticker,
            provider: session.provider,
            stage: session.stage,
            status_message: session.status_message,
            candles: session.candles,
            epoch_log: session.epoch_log,
            result: session.result,
            explanation,
            error: session.error,
            started_at: session.started_at.map(|t| t.to_rfc3339()),
            finished_at: session.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

// =============================================================================
// Serialisable snapshot
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub run_id: Option<Uuid>,
    pub ticker: Option<String>,
    pub provider: Option<ProviderKind>,
    pub stage: Stage,
    pub status_message: String,
    pub candles: Vec<Candle>,
    pub epoch_log: Vec<EpochProgress>,
    pub result: Option<PredictionResult>,
    pub explanation: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> PredictionResult {
        PredictionResult::from_prices(100.0, 101.0, &[1.0; 15], 63)
    }

    #[test]
    fn begin_run_normalises_ticker_and_bumps_version() {
        let state = AppState::new(RuntimeConfig::default());
        let before = state.current_state_version();
        state.begin_run("  aapl ", ProviderKind::Yahoo).unwrap();
        let snap = state.build_snapshot();
        assert_eq!(snap.ticker.as_deref(), Some("AAPL"));
        assert_eq!(snap.stage, Stage::Fetching);
        assert!(snap.state_version > before);
    }

    #[test]
    fn empty_ticker_is_rejected() {
        let state = AppState::new(RuntimeConfig::default());
        assert_eq!(
            state.begin_run("   ", ProviderKind::Yahoo).unwrap_err(),
            RunRejected::EmptyTicker
        );
    }

    #[test]
    fn second_run_is_rejected_while_busy() {
        let state = AppState::new(RuntimeConfig::default());
        state.begin_run("TSLA", ProviderKind::Yahoo).unwrap();
        let err = state.begin_run("NVDA", ProviderKind::Yahoo).unwrap_err();
        assert_eq!(
            err,
            RunRejected::Busy {
                ticker: "TSLA".into()
            }
        );
    }

    #[test]
    fn events_fold_into_session() {
        let state = AppState::new(RuntimeConfig::default());
        let (id, _) = state.begin_run("MMM", ProviderKind::Yahoo).unwrap();

        state.apply_event(
            id,
            &PipelineEvent::CandlesLoaded {
                candles: vec![Candle::new(0, 1.0, 1.0, 1.0, 1.0, 1.0)],
            },
        );
        state.apply_event(id, &PipelineEvent::StageEntered { stage: Stage::Training });
        state.apply_event(
            id,
            &PipelineEvent::Epoch(EpochProgress {
                epoch: 0,
                epochs: 100,
                loss: 0.05,
            }),
        );
        state.apply_event(id, &PipelineEvent::Completed(result()));

        let snap = state.build_snapshot();
        assert_eq!(snap.stage, Stage::Done);
        assert_eq!(snap.candles.len(), 1);
        assert_eq!(snap.epoch_log.len(), 1);
        assert!(snap.result.is_some());
        assert!(snap.explanation.unwrap().contains("MMM"));
        assert!(snap.finished_at.is_some());
        assert!(!state.cancel_run());
    }

    #[test]
    fn new_run_clears_stale_result() {
        let state = AppState::new(RuntimeConfig::default());
        let (id, _) = state.begin_run("AAPL", ProviderKind::Yahoo).unwrap();
        state.apply_event(id, &PipelineEvent::Completed(result()));
        assert!(state.latest_result().is_some());

        let (id2, _) = state.begin_run("XOM", ProviderKind::Yahoo).unwrap();
        assert!(state.latest_result().is_none());
        state.apply_event(
            id2,
            &PipelineEvent::Failed {
                message: "data fetch failed: no candles".into(),
            },
        );
        let snap = state.build_snapshot();
        assert_eq!(snap.stage, Stage::Failed);
        assert!(snap.result.is_none());
        assert!(snap.candles.is_empty());
        assert_eq!(snap.error.as_deref(), Some("data fetch failed: no candles"));
    }

    #[test]
    fn events_from_previous_run_are_ignored() {
        let state = AppState::new(RuntimeConfig::default());
        let (old, _) = state.begin_run("AAPL", ProviderKind::Yahoo).unwrap();
        state.apply_event(old, &PipelineEvent::Failed { message: "x".into() });
        state.begin_run("XOM", ProviderKind::Yahoo).unwrap();

        state.apply_event(old, &PipelineEvent::Completed(result()));
        assert!(state.latest_result().is_none());
        assert_eq!(state.build_snapshot().stage, Stage::Fetching);
    }

    #[test]
    fn cancel_run_fires_the_token() {
        let state = AppState::new(RuntimeConfig::default());
        let (_, token) = state.begin_run("PLTR", ProviderKind::Yahoo).unwrap();
        assert!(state.cancel_run());
        assert!(token.is_cancelled());
    }
}
