// =============================================================================
// Feature Builder
// =============================================================================
//
// Aligns the ten indicator series against the raw candles:
//
//   offset = max over indicators of (n - len(indicator))
//   row i  = OHLCV of candle[offset + i] ++ indicator_k[i] for every k
//
// Every indicator series starts at its own warm-up boundary, and the single
// largest offset is applied to all of them. The rows are then cleaned: any row
// holding a NaN or infinite cell is dropped on its own.
// =============================================================================

use tracing::{debug, warn};

use super::{FeatureVector, FEATURE_COUNT};
use crate::error::ForecastError;
use crate::indicators::IndicatorSet;
use crate::market_data::Candle;

/// Time-ordered feature rows in raw (un-normalized) units.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: Vec<FeatureVector>,
}

impl FeatureMatrix {
    pub fn from_rows(rows: Vec<FeatureVector>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[FeatureVector] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<FeatureVector> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Most recent row.
    pub fn last(&self) -> Option<&FeatureVector> {
        self.rows.last()
    }

    /// Drop every row that holds a non-finite cell. Idempotent.
    pub fn clean(mut self) -> Self {
        self.rows.retain(|row| row.iter().all(|v| v.is_finite()));
        self
    }
}

/// Warm-up gap shared by every column: the largest `n - len(indicator)`.
pub fn alignment_offset(candle_count: usize, indicators: &IndicatorSet) -> usize {
    indicators
        .series()
        .map(|s| candle_count.saturating_sub(s.len()))
        .max()
        .unwrap_or(0)
}

/// Assemble the aligned, uncleaned rows.
pub fn assemble_rows(candles: &[Candle], indicators: &IndicatorSet) -> FeatureMatrix {
    let offset = alignment_offset(candles.len(), indicators);
    let series: Vec<&Vec<f64>> = indicators.series().collect();

    let rows = candles
        .iter()
        .skip(offset)
        .enumerate()
        .map(|(i, c)| {
            let mut row: FeatureVector = [0.0; FEATURE_COUNT];
            row[..5].copy_from_slice(&[c.open, c.high, c.low, c.close, c.volume]);
            for (k, s) in series.iter().enumerate() {
                row[5 + k] = s.get(i).copied().unwrap_or(f64::NAN);
            }
            row
        })
        .collect();

    debug!(candles = candles.len(), offset, "feature rows assembled");
    FeatureMatrix::from_rows(rows)
}

/// Build the clean feature matrix and enforce the minimum training size.
///
/// Fails with [`ForecastError::InsufficientData`] when fewer than `min_rows`
/// rows survive cleaning.
pub fn build_feature_matrix(
    candles: &[Candle],
    indicators: &IndicatorSet,
    min_rows: usize,
) -> Result<FeatureMatrix, ForecastError> {
    let assembled = assemble_rows(candles, indicators);
    let before = assembled.len();
    let matrix = assembled.clean();

    let dropped = before - matrix.len();
    if dropped > 0 {
        warn!(dropped, kept = matrix.len(), "dropped feature rows with non-finite cells");
    }

    if matrix.len() < min_rows {
        return Err(ForecastError::InsufficientData {
            stage: "feature building",
            required: min_rows,
            actual: matrix.len(),
        });
    }

    Ok(matrix)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::CLOSE_COLUMN;
    use crate::indicators::{IndicatorPeriods, IndicatorSet};
    use crate::market_data::closes;

    const DAY: i64 = 86_400_000;

    fn ascending(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let p = 100.0 + i as f64;
                Candle::new(i as i64 * DAY, p - 0.5, p + 1.0, p - 1.0, p, 5_000.0)
            })
            .collect()
    }

    fn indicators_for(candles: &[Candle]) -> IndicatorSet {
        IndicatorSet::compute(&closes(candles), &IndicatorPeriods::default())
    }

    #[test]
    fn offset_is_largest_warm_up_gap() {
        let candles = ascending(200);
        // SMA100 has the longest warm-up: 200 - 101 = 99.
        assert_eq!(alignment_offset(candles.len(), &indicators_for(&candles)), 99);
    }

    #[test]
    fn rows_follow_literal_index_alignment() {
        let candles = ascending(200);
        let set = indicators_for(&candles);
        let matrix = assemble_rows(&candles, &set);
        assert_eq!(matrix.len(), 101);

        let first = matrix.rows()[0];
        assert_eq!(first[CLOSE_COLUMN], candles[99].close);
        assert_eq!(first[4], 5_000.0);
        // Every indicator column reads index 0 of its own series.
        assert_eq!(first[5], set.ema[0][0]);
        assert_eq!(first[11], set.sma[3][0]);
        assert_eq!(first[14], set.rsi[2][0]);
    }

    #[test]
    fn cleaning_drops_rows_independently() {
        let mut rows = vec![[1.0; FEATURE_COUNT]; 5];
        rows[1][7] = f64::NAN;
        rows[3][0] = f64::INFINITY;
        let cleaned = FeatureMatrix::from_rows(rows).clean();
        assert_eq!(cleaned.len(), 3);
    }

    #[test]
    fn cleaning_is_idempotent() {
        let mut rows: Vec<FeatureVector> = (0..10).map(|i| [i as f64; FEATURE_COUNT]).collect();
        rows[4][2] = f64::NEG_INFINITY;
        let once = FeatureMatrix::from_rows(rows).clean();
        let twice = once.clone().clean();
        assert_eq!(once, twice);
    }

    #[test]
    fn nan_close_is_cleaned_not_propagated() {
        let mut candles = ascending(250);
        candles[180].close = f64::NAN;
        let matrix = build_feature_matrix(&candles, &indicators_for(&candles), 10).unwrap();
        assert!(matrix.len() < 151);
        assert!(matrix.rows().iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn insufficient_rows_fail() {
        let candles = ascending(150); // 51 rows after warm-up
        let err = build_feature_matrix(&candles, &indicators_for(&candles), 80).unwrap_err();
        assert_eq!(
            err,
            ForecastError::InsufficientData {
                stage: "feature building",
                required: 80,
                actual: 51,
            }
        );
    }

    #[test]
    fn too_short_history_yields_no_rows() {
        let candles = ascending(60); // SMA100 cannot be computed
        let err = build_feature_matrix(&candles, &indicators_for(&candles), 1).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientData { actual: 0, .. }));
    }
}
