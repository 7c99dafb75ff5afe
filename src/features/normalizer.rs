// =============================================================================
// Min-Max Normalizer
// =============================================================================
//
//   normalized = (v - min) / (max - min)
//   original   = normalized * (max - min) + min
//
// Bounds are fitted once per run and stamped with a fresh id. The id travels
// with the normalized data into the trained model so the predictor can refuse
// bounds that belong to a different run.
//
// Degenerate column (max == min, e.g. constant volume): every cell maps to
// 0.0, and de-normalization returns `min`. No NaN is ever produced here.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{FeatureMatrix, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

/// Observed range of one feature column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnBounds {
    pub min: f64,
    pub max: f64,
}

impl ColumnBounds {
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn is_degenerate(&self) -> bool {
        self.span() == 0.0
    }

    pub fn normalize(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            0.0
        } else {
            (value - self.min) / self.span()
        }
    }

    pub fn denormalize(&self, value: f64) -> f64 {
        value * self.span() + self.min
    }
}

/// Per-column bounds fitted on one feature matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationBounds {
    id: Uuid,
    columns: [ColumnBounds; FEATURE_COUNT],
}

impl NormalizationBounds {
    /// Per-column min and max across all rows of `matrix`.
    ///
    /// An empty matrix yields all-zero (degenerate) bounds.
    pub fn fit(matrix: &FeatureMatrix) -> Self {
        let mut columns = [ColumnBounds {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }; FEATURE_COUNT];

        for row in matrix.rows() {
            for (bounds, &v) in columns.iter_mut().zip(row.iter()) {
                bounds.min = bounds.min.min(v);
                bounds.max = bounds.max.max(v);
            }
        }

        if matrix.is_empty() {
            columns = [ColumnBounds { min: 0.0, max: 0.0 }; FEATURE_COUNT];
        }

        let bounds = Self {
            id: Uuid::new_v4(),
            columns,
        };

        let degenerate: Vec<&str> = bounds
            .columns
            .iter()
            .zip(FEATURE_NAMES)
            .filter(|(b, _)| b.is_degenerate())
            .map(|(_, name)| name)
            .collect();
        if !degenerate.is_empty() {
            debug!(columns = ?degenerate, "constant feature columns normalize to 0");
        }

        bounds
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn column(&self, index: usize) -> &ColumnBounds {
        &self.columns[index]
    }

    /// Map every cell of `matrix` into [0, 1] using these bounds.
    pub fn normalize(&self, matrix: FeatureMatrix) -> NormalizedMatrix {
        let rows = matrix
            .into_rows()
            .into_iter()
            .map(|row| self.normalize_row(&row))
            .collect();

        NormalizedMatrix {
            rows,
            bounds_id: self.id,
        }
    }

    pub fn normalize_row(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for ((o, &v), b) in out.iter_mut().zip(row.iter()).zip(self.columns.iter()) {
            *o = b.normalize(v);
        }
        out
    }
}

/// Inverse of the column mapping: `value * (max - min) + min`.
pub fn denormalize_column(value: f64, column: usize, bounds: &NormalizationBounds) -> f64 {
    bounds.column(column).denormalize(value)
}

/// Feature rows scaled by one particular [`NormalizationBounds`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMatrix {
    rows: Vec<FeatureVector>,
    bounds_id: Uuid,
}

impl NormalizedMatrix {
    /// The scaled rows and the id of the bounds they were scaled with.
    pub(crate) fn into_parts(self) -> (Vec<FeatureVector>, Uuid) {
        (self.rows, self.bounds_id)
    }
}
