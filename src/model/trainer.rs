// =============================================================================
// Trainer
// =============================================================================
//
// Mini-batch training loop:
//
//   for epoch in 0..epochs
//     check cancel token
//     shuffle example indices
//     for batch: forward -> MSE -> backward -> Adam step
//     report the example-weighted mean loss of the epoch
//
// A NaN or infinite batch loss aborts the run immediately.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::{ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::adam::Adam;
use super::network::SequenceRegressor;
use super::ModelConfig;
use crate::error::ForecastError;
use crate::features::{TrainingSet, CLOSE_COLUMN, FEATURE_COUNT};

/// Per-epoch notification. `epoch` is the 0-based epoch index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochProgress {
    pub epoch: usize,
    pub epochs: usize,
    pub loss: f64,
}

/// Cooperative cancellation flag, checked before every epoch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A fitted network, tied to the normalization bounds of its training data.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    network: SequenceRegressor,
    bounds_id: Uuid,
    final_loss: f64,
}

impl TrainedModel {
    /// Normalized prediction for one (lookback, features) sequence.
    pub fn predict(&self, sequence: ArrayView2<f64>) -> f64 {
        self.network.predict_one(sequence)
    }

    pub fn bounds_id(&self) -> Uuid {
        self.bounds_id
    }

    /// Mean training loss of the last epoch.
    pub fn final_loss(&self) -> f64 {
        self.final_loss
    }
}

/// Fit a freshly initialised network on `set`.
///
/// `on_epoch` is called after every completed epoch; its return value is not
/// awaited or inspected.
pub fn train<F>(
    set: &TrainingSet,
    config: &ModelConfig,
    cancel: &CancelToken,
    mut on_epoch: F,
) -> Result<TrainedModel, ForecastError>
where
    F: FnMut(EpochProgress),
{
    let n = set.len();
    if n == 0 {
        return Err(ForecastError::InsufficientData {
            stage: "training",
            required: 1,
            actual: 0,
        });
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut network = SequenceRegressor::new(FEATURE_COUNT, config, &mut rng);
    if config.anchor_last_close {
        network = network.with_anchor(CLOSE_COLUMN);
    }
    let mut adam = Adam::new(config.learning_rate);
    let batch_size = config.batch_size.max(1);
    let mut indices: Vec<usize> = (0..n).collect();
    let mut last_loss = f64::NAN;

    info!(
        examples = n,
        lookback = set.lookback(),
        epochs = config.epochs,
        batch_size,
        "training started"
    );

    for epoch in 0..config.epochs {
        if cancel.is_cancelled() {
            info!(epoch, "training cancelled");
            return Err(ForecastError::Cancelled);
        }

        indices.shuffle(&mut rng);
        let mut weighted_loss = 0.0;

        for chunk in indices.chunks(batch_size) {
            let x = set.sequences.select(Axis(0), chunk);
            let y = set.labels.select(Axis(0), chunk);

            let (pred, cache) = network.forward_train(x.view(), &mut rng);
            let diff = &pred - &y;
            let loss = diff.mapv(|d| d * d).sum() / chunk.len() as f64;
            if !loss.is_finite() {
                return Err(ForecastError::TrainingDiverged { epoch });
            }

            let d_pred = diff * (2.0 / chunk.len() as f64);
            let grads = network.backward(&cache, &d_pred);
            network.apply(&grads, &adam.next_step());

            weighted_loss += loss * chunk.len() as f64;
        }

        last_loss = weighted_loss / n as f64;
        debug!(epoch, loss = last_loss, "epoch finished");
        if (epoch + 1) % 10 == 0 || epoch + 1 == config.epochs {
            info!(epoch = epoch + 1, epochs = config.epochs, loss = last_loss, "training progress");
        }
        on_epoch(EpochProgress {
            epoch,
            epochs: config.epochs,
            loss: last_loss,
        });
    }

    info!(loss = last_loss, steps = adam.steps(), "training finished");
    Ok(TrainedModel {
        network,
        bounds_id: set.bounds_id,
        final_loss: last_loss,
    })
}
