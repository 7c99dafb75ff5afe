// =============================================================================
// Predictor
// =============================================================================
//
//   predicted   = denormalize(model(last_sequence), CLOSE)
//   change      = (predicted - last_close) / last_close
//   projection  = last_close * (1 + change)^horizon
//
// The projection simply compounds the single next-day change over the
// horizon (63 trading days ≈ one quarter). It is not a multi-step forecast.
// =============================================================================

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ForecastError;
use crate::features::{
    denormalize_column, FeatureVector, NormalizationBounds, CLOSE_COLUMN, FEATURE_COUNT,
    FEATURE_NAMES, OPEN_COLUMN,
};
use crate::model::TrainedModel;

/// Trading days in roughly three months.
pub const DEFAULT_PROJECTION_HORIZON: u32 = 63;

/// Features shown for audit: the latest raw row without `open`.
pub const AUDIT_FEATURE_COUNT: usize = FEATURE_COUNT - 1;

/// Tickers offered as starting points in the CLI and dashboard.
pub const SUGGESTED_TICKERS: &[(&str, &str)] = &[
    ("LKNCY", "Luckin Coffee"),
    ("MMM", "3M"),
    ("TSLA", "Tesla"),
    ("AAPL", "Apple"),
    ("PLTR", "Palantir"),
    ("VRT", "Vertiv"),
    ("XOM", "ExxonMobil"),
    ("META", "Meta Platforms"),
    ("NVDA", "NVIDIA"),
    ("DDOG", "Datadog"),
    ("AMZN", "Amazon"),
];

/// Final output of one forecasting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub last_close: f64,
    pub next_day_value: f64,
    /// Fractional change, e.g. 0.012 for +1.2 %.
    pub next_day_change: f64,
    pub three_month_projection: f64,
    /// Raw feature values of the most recent day, `High` through `RSI28`.
    pub prediction_features: Vec<f64>,
}

/// What an investment would be worth if the forecast played out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InvestmentProjection {
    pub amount: f64,
    pub next_day_value: f64,
    pub three_month_value: f64,
}

/// Run the model on the latest window and derive the headline figures.
///
/// `latest_row` is the raw (un-normalized) feature vector of the most recent
/// day; its close is the reference price.
pub fn predict(
    model: &TrainedModel,
    last_sequence: ArrayView2<f64>,
    bounds: &NormalizationBounds,
    latest_row: &FeatureVector,
    horizon: u32,
) -> Result<PredictionResult, ForecastError> {
    if model.bounds_id() != bounds.id() {
        return Err(ForecastError::BoundsMismatch);
    }

    let normalized = model.predict(last_sequence);
    let next_day_value = denormalize_column(normalized, CLOSE_COLUMN, bounds);
    let last_close = latest_row[CLOSE_COLUMN];

    if !next_day_value.is_finite() {
        return Err(ForecastError::InvalidPrediction {
            value: next_day_value,
        });
    }
    if !(last_close.is_finite() && last_close > 0.0) {
        return Err(ForecastError::InvalidPrediction { value: last_close });
    }

    let result = PredictionResult::from_prices(last_close, next_day_value, latest_row, horizon);
    info!(
        last_close,
        next_day_value,
        change_pct = result.next_day_change * 100.0,
        projection = result.three_month_projection,
        "prediction ready"
    );
    Ok(result)
}

impl PredictionResult {
    /// Derive the change and projection from a reference and a predicted price.
    pub fn from_prices(
        last_close: f64,
        next_day_value: f64,
        latest_row: &FeatureVector,
        horizon: u32,
    ) -> Self {
        let next_day_change = (next_day_value - last_close) / last_close;
        let three_month_projection = last_close * (1.0 + next_day_change).powi(horizon as i32);

        Self {
            last_close,
            next_day_value,
            next_day_change,
            three_month_projection,
            prediction_features: latest_row[OPEN_COLUMN + 1..].to_vec(),
        }
    }

    pub fn is_appreciation(&self) -> bool {
        self.next_day_change >= 0.0
    }

    /// One-paragraph plain-language summary of the forecast.
    pub fn explanation(&self, ticker: &str) -> String {
        let direction = if self.is_appreciation() {
            "an APPRECIATION"
        } else {
            "a DEPRECIATION"
        };
        format!(
            "Based on the patterns of the last 30 days of technical indicators \
             (moving averages and RSI), the model forecasts {direction} for {ticker} \
             on the next trading day, with an estimated change of {:.2}%, \
             projecting the price to {:.2}.",
            (self.next_day_change * 100.0).abs(),
            self.next_day_value,
        )
    }

    /// `(name, value)` pairs for the audit features.
    pub fn labelled_features(&self) -> Vec<(&'static str, f64)> {
        FEATURE_NAMES[OPEN_COLUMN + 1..]
            .iter()
            .copied()
            .zip(self.prediction_features.iter().copied())
            .collect()
    }

    /// Value of `amount` after one day and after the projection horizon.
    pub fn project_investment(&self, amount: f64) -> InvestmentProjection {
        InvestmentProjection {
            amount,
            next_day_value: amount * (1.0 + self.next_day_change),
            three_month_value: amount * (self.three_month_projection / self.last_close),
        }
    }
}
