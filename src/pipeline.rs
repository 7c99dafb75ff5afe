// =============================================================================
// Forecast Pipeline — explicit state machine
// =============================================================================
//
//   Idle -> Fetching -> Building -> Normalizing -> Windowing
//        -> Training -> Predicting -> Done | Failed
//
// Each state owns the data produced by the stage before it; advancing
// consumes the state. Fetching is async (network). Everything from Building
// onwards is CPU-bound and runs on the blocking pool.
//
// Progress leaves the pipeline as `PipelineEvent`s on an unbounded channel.
// Every run ends with exactly one `Completed` or `Failed` event.
// =============================================================================

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::error::ForecastError;
use crate::features::{
    build_feature_matrix, window_sequences, FeatureMatrix, FeatureVector, NormalizationBounds,
    NormalizedMatrix, Windowed,
};
use crate::indicators::{IndicatorPeriods, IndicatorSet};
use crate::market_data::{closes, validate_series, Candle, MarketDataProvider};
use crate::model::{self, ModelConfig, TrainedModel};
use crate::predictor::{self, PredictionResult, DEFAULT_PROJECTION_HORIZON};
use crate::types::DateRange;

pub use crate::model::{CancelToken, EpochProgress};

// =============================================================================
// Configuration
// =============================================================================

fn default_lookback() -> usize {
    30
}

fn default_min_rows_margin() -> usize {
    50
}

fn default_projection_horizon() -> u32 {
    DEFAULT_PROJECTION_HORIZON
}

/// Every tunable constant of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Days per input sequence.
    #[serde(default = "default_lookback")]
    pub lookback: usize,

    /// Clean feature rows required beyond `lookback`.
    #[serde(default = "default_min_rows_margin")]
    pub min_rows_margin: usize,

    /// Trading days compounded into the trend projection.
    #[serde(default = "default_projection_horizon")]
    pub projection_horizon: u32,

    #[serde(default)]
    pub periods: IndicatorPeriods,

    #[serde(default)]
    pub model: ModelConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            min_rows_margin: default_min_rows_margin(),
            projection_horizon: default_projection_horizon(),
            periods: IndicatorPeriods::default(),
            model: ModelConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Minimum clean rows the feature builder must deliver.
    pub fn min_rows(&self) -> usize {
        self.lookback + self.min_rows_margin
    }
}

// =============================================================================
// States & events
// =============================================================================

/// Data-free view of a [`PipelineState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Fetching,
    Building,
    Normalizing,
    Windowing,
    Training,
    Predicting,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    pub fn is_running(self) -> bool {
        !matches!(self, Stage::Idle | Stage::Done | Stage::Failed)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Fetching => "fetching",
            Stage::Building => "building",
            Stage::Normalizing => "normalizing",
            Stage::Windowing => "windowing",
            Stage::Training => "training",
            Stage::Predicting => "predicting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A pipeline run, one variant per stage, carrying that stage's input.
#[derive(Debug)]
pub enum PipelineState {
    Idle,
    Fetching {
        ticker: String,
    },
    Building {
        candles: Vec<Candle>,
    },
    Normalizing {
        matrix: FeatureMatrix,
    },
    Windowing {
        normalized: NormalizedMatrix,
        bounds: NormalizationBounds,
        latest: FeatureVector,
    },
    Training {
        windowed: Windowed,
        bounds: NormalizationBounds,
        latest: FeatureVector,
    },
    Predicting {
        model: TrainedModel,
        last_sequence: Array2<f64>,
        bounds: NormalizationBounds,
        latest: FeatureVector,
    },
    Done(PredictionResult),
    Failed(ForecastError),
}

impl PipelineState {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Idle => Stage::Idle,
            Self::Fetching { .. } => Stage::Fetching,
            Self::Building { .. } => Stage::Building,
            Self::Normalizing { .. } => Stage::Normalizing,
            Self::Windowing { .. } => Stage::Windowing,
            Self::Training { .. } => Stage::Training,
            Self::Predicting { .. } => Stage::Predicting,
            Self::Done(_) => Stage::Done,
            Self::Failed(_) => Stage::Failed,
        }
    }
}

/// Notifications emitted while a run progresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageEntered { stage: Stage },
    CandlesLoaded { candles: Vec<Candle> },
    Epoch(EpochProgress),
    Completed(PredictionResult),
    Failed { message: String },
}

// =============================================================================
// Pipeline
// =============================================================================

/// Runs one forecast per call; holds no state between runs.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    events: Option<UnboundedSender<PipelineEvent>>,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            events: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_events(mut self, events: UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that aborts the run at the next stage or epoch boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Fetch `ticker` from `provider` and run every stage.
    pub async fn run(
        &self,
        provider: &MarketDataProvider,
        ticker: &str,
        range: &DateRange,
    ) -> Result<PredictionResult, ForecastError> {
        let result = self.fetch_and_execute(provider, ticker, range).await;
        self.finish(result)
    }

    /// Run every stage after fetching on candles the caller already has.
    pub async fn run_on_candles(
        &self,
        candles: Vec<Candle>,
    ) -> Result<PredictionResult, ForecastError> {
        let result = match self.accept_candles(candles) {
            Ok(candles) => self.execute_blocking(candles).await,
            Err(e) => Err(e),
        };
        self.finish(result)
    }

    async fn fetch_and_execute(
        &self,
        provider: &MarketDataProvider,
        ticker: &str,
        range: &DateRange,
    ) -> Result<PredictionResult, ForecastError> {
        let state = PipelineState::Fetching {
            ticker: ticker.to_string(),
        };
        self.enter(&state);
        info!(
            ticker,
            provider = %provider.kind(),
            start = %range.start,
            end = %range.end,
            "fetching candles"
        );

        let candles = provider
            .fetch_daily(ticker, range)
            .await
            .map_err(|e| ForecastError::data_fetch(format!("{e:#}")))?;
        let candles = self.accept_candles(candles)?;
        self.execute_blocking(candles).await
    }

    /// Validate provider output and publish it for charting.
    fn accept_candles(&self, candles: Vec<Candle>) -> Result<Vec<Candle>, ForecastError> {
        validate_series(&candles)?;
        info!(candles = candles.len(), "candles loaded");
        self.emit(PipelineEvent::CandlesLoaded {
            candles: candles.clone(),
        });
        Ok(candles)
    }

    async fn execute_blocking(&self, candles: Vec<Candle>) -> Result<PredictionResult, ForecastError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.execute(candles))
            .await
            .map_err(|e| ForecastError::Worker {
                message: e.to_string(),
            })?
    }

    /// Drive the CPU-bound stages to a terminal state.
    fn execute(&self, candles: Vec<Candle>) -> Result<PredictionResult, ForecastError> {
        let mut state = PipelineState::Building { candles };
        loop {
            let stage = state.stage();
            match state {
                PipelineState::Done(result) => return Ok(result),
                PipelineState::Failed(err) => return Err(err),
                PipelineState::Idle | PipelineState::Fetching { .. } => {
                    return Err(ForecastError::Worker {
                        message: format!("cannot execute from stage {stage}"),
                    })
                }
                running => {
                    self.enter(&running);
                    state = self.advance(running);
                }
            }
        }
    }

    /// Consume one state and produce the next.
    pub fn advance(&self, state: PipelineState) -> PipelineState {
        if self.cancel.is_cancelled() && state.stage().is_running() {
            return PipelineState::Failed(ForecastError::Cancelled);
        }

        match state {
            PipelineState::Building { candles } => {
                let indicators = IndicatorSet::compute(&closes(&candles), &self.config.periods);
                match build_feature_matrix(&candles, &indicators, self.config.min_rows()) {
                    Ok(matrix) => PipelineState::Normalizing { matrix },
                    Err(e) => PipelineState::Failed(e),
                }
            }

            PipelineState::Normalizing { matrix } => {
                let Some(latest) = matrix.last().copied() else {
                    return PipelineState::Failed(ForecastError::InsufficientData {
                        stage: "normalization",
                        required: 1,
                        actual: 0,
                    });
                };
                let bounds = NormalizationBounds::fit(&matrix);
                let normalized = bounds.normalize(matrix);
                PipelineState::Windowing {
                    normalized,
                    bounds,
                    latest,
                }
            }

            PipelineState::Windowing {
                normalized,
                bounds,
                latest,
            } => match window_sequences(normalized, self.config.lookback) {
                Ok(windowed) => {
                    info!(examples = windowed.training.len(), "training set ready");
                    PipelineState::Training {
                        windowed,
                        bounds,
                        latest,
                    }
                }
                Err(e) => PipelineState::Failed(e),
            },

            PipelineState::Training {
                windowed,
                bounds,
                latest,
            } => {
                let trained = model::train(&windowed.training, &self.config.model, &self.cancel, |p| {
                    self.emit(PipelineEvent::Epoch(p))
                });
                match trained {
                    Ok(model) => {
                        info!(loss = model.final_loss(), "model trained");
                        PipelineState::Predicting {
                            model,
                            last_sequence: windowed.last_sequence,
                            bounds,
                            latest,
                        }
                    }
                    Err(e) => PipelineState::Failed(e),
                }
            }

            PipelineState::Predicting {
                model,
                last_sequence,
                bounds,
                latest,
            } => match predictor::predict(
                &model,
                last_sequence.view(),
                &bounds,
                &latest,
                self.config.projection_horizon,
            ) {
                Ok(result) => PipelineState::Done(result),
                Err(e) => PipelineState::Failed(e),
            },

            other => other,
        }
    }

    fn enter(&self, state: &PipelineState) {
        let stage = state.stage();
        match state {
            PipelineState::Fetching { ticker } => info!(%stage, %ticker, "pipeline stage"),
            _ => info!(%stage, "pipeline stage"),
        }
        self.emit(PipelineEvent::StageEntered { stage });
    }

    fn finish(
        &self,
        result: Result<PredictionResult, ForecastError>,
    ) -> Result<PredictionResult, ForecastError> {
        match &result {
            Ok(r) => self.emit(PipelineEvent::Completed(r.clone())),
            Err(e) => {
                warn!(error = %e, "pipeline failed");
                self.emit(PipelineEvent::Failed {
                    message: e.to_string(),
                });
            }
        }
        result
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening any more.
            let _ = tx.send(event);
        }
    }
}
