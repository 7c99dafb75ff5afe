// =============================================================================
// Sequence Windower
// =============================================================================
//
// Slides a window of `lookback` rows over the normalized matrix:
//
//   example i: sequence = rows[i .. i + lookback]
//              label    = rows[i + lookback][CLOSE]
//
// m rows give m - lookback examples. The final `lookback` rows are also kept
// as the prediction input, since they have no label yet.
// =============================================================================

use ndarray::{Array1, Array2, Array3};
use uuid::Uuid;

use super::{NormalizedMatrix, CLOSE_COLUMN, FEATURE_COUNT};
use crate::error::ForecastError;

/// Supervised examples: `sequences` is (examples, lookback, features).
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub sequences: Array3<f64>,
    pub labels: Array1<f64>,
    pub bounds_id: Uuid,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn lookback(&self) -> usize {
        self.sequences.shape()[1]
    }
}

/// Output of windowing: the training examples plus the latest window.
#[derive(Debug, Clone)]
pub struct Windowed {
    pub training: TrainingSet,
    /// (lookback, features), the most recent rows in time order.
    pub last_sequence: Array2<f64>,
}

/// Cut `matrix` into overlapping sequences of `lookback` rows.
///
/// Fails with [`ForecastError::InsufficientData`] unless the matrix holds more
/// than `lookback` rows.
pub fn window_sequences(matrix: NormalizedMatrix, lookback: usize) -> Result<Windowed, ForecastError> {
    let (rows, bounds_id) = matrix.into_parts();
    let m = rows.len();

    if lookback == 0 || m <= lookback {
        return Err(ForecastError::InsufficientData {
            stage: "windowing",
            required: lookback + 1,
            actual: m,
        });
    }

    let examples = m - lookback;
    let sequences = Array3::from_shape_fn((examples, lookback, FEATURE_COUNT), |(i, t, f)| {
        rows[i + t][f]
    });
    let labels = Array1::from_shape_fn(examples, |i| rows[i + lookback][CLOSE_COLUMN]);
    let last_sequence =
        Array2::from_shape_fn((lookback, FEATURE_COUNT), |(t, f)| rows[m - lookback + t][f]);

    Ok(Windowed {
        training: TrainingSet {
            sequences,
            labels,
            bounds_id,
        },
        last_sequence,
    })
}
