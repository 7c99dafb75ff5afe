// =============================================================================
// Forecast Errors
// =============================================================================
//
// Every pipeline stage reports failures through `ForecastError`. All variants
// are terminal for the run that produced them; nothing is retried
// automatically.
// =============================================================================

use thiserror::Error;

/// Failure of a single forecasting run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    /// The market data provider failed or returned unusable data.
    #[error("data fetch failed: {message}")]
    DataFetch {
        /// Human-readable reason, shown to the user as-is.
        message: String,
    },

    /// Too few rows survived feature building or windowing.
    #[error("insufficient data for {stage}: required {required} rows, got {actual}")]
    InsufficientData {
        /// Stage that ran out of data (e.g. "feature building").
        stage: &'static str,
        required: usize,
        actual: usize,
    },

    /// The training loss became NaN or infinite.
    #[error("training diverged at epoch {epoch}: loss is not finite")]
    TrainingDiverged { epoch: usize },

    /// The de-normalized prediction could not be used.
    #[error("invalid prediction: {value}")]
    InvalidPrediction { value: f64 },

    /// The normalization bounds do not belong to the model's training run.
    #[error("normalization bounds do not match the bounds the model was trained with")]
    BoundsMismatch,

    /// The run was cancelled through its cancel token.
    #[error("run cancelled")]
    Cancelled,

    /// The blocking worker that runs the CPU-bound stages failed.
    #[error("pipeline worker failed: {message}")]
    Worker { message: String },
}

impl ForecastError {
    /// Shorthand for a [`ForecastError::DataFetch`] with the given message.
    pub fn data_fetch(message: impl Into<String>) -> Self {
        Self::DataFetch {
            message: message.into(),
        }
    }
}
