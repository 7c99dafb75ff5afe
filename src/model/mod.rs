// =============================================================================
// Sequence Model
// =============================================================================
//
//   (batch, lookback, 15)
//     -> LSTM(hidden, full sequence) -> Dropout
//     -> LSTM(hidden, last step)     -> Dropout
//     -> Dense(1) [+ last input close]
//
// With `anchor_last_close` the head predicts the one-step change of the
// normalized close; the close of the window's last row is added back.
//
// Plain ndarray implementation with hand-written backprop through time. The
// whole model lives for one run; nothing is persisted.
// =============================================================================

pub mod adam;
pub mod dense;
pub mod lstm;
pub mod network;
pub mod trainer;

use serde::{Deserialize, Serialize};

pub use trainer::{train, CancelToken, EpochProgress, TrainedModel};

fn default_epochs() -> usize {
    100
}

fn default_batch_size() -> usize {
    32
}

fn default_hidden_units() -> usize {
    50
}

fn default_recurrent_layers() -> usize {
    2
}

fn default_dropout() -> f64 {
    0.2
}

fn default_learning_rate() -> f64 {
    0.001
}

fn default_anchor_last_close() -> bool {
    true
}

/// Architecture and training hyper-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Units per recurrent layer.
    #[serde(default = "default_hidden_units")]
    pub hidden_units: usize,

    /// Stacked LSTM layers; only the last one collapses the time axis.
    #[serde(default = "default_recurrent_layers")]
    pub recurrent_layers: usize,

    /// Dropout rate applied after every recurrent layer while training.
    #[serde(default = "default_dropout")]
    pub dropout: f64,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Add the last input close to the head output.
    #[serde(default = "default_anchor_last_close")]
    pub anchor_last_close: bool,

    /// Fixed RNG seed for weight init, shuffling and dropout. `None` draws
    /// from OS entropy, so two runs will not converge to the same weights.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            hidden_units: default_hidden_units(),
            recurrent_layers: default_recurrent_layers(),
            dropout: default_dropout(),
            learning_rate: default_learning_rate(),
            anchor_last_close: default_anchor_last_close(),
            seed: None,
        }
    }
}

#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
