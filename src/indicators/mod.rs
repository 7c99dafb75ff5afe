// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator implementations over closing prices. Each
// function returns a plain `Vec<f64>` whose index 0 is the first day the
// indicator is defined; an empty vec means the period could not be served.

pub mod ema;
pub mod rsi;
pub mod sma;

use serde::{Deserialize, Serialize};

use self::ema::calculate_ema;
use self::rsi::calculate_rsi;
use self::sma::calculate_sma;

/// Periods of the ten indicators that make up the feature vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorPeriods {
    #[serde(default = "default_ema_periods")]
    pub ema: [usize; 3],
    #[serde(default = "default_sma_periods")]
    pub sma: [usize; 4],
    #[serde(default = "default_rsi_periods")]
    pub rsi: [usize; 3],
}

fn default_ema_periods() -> [usize; 3] {
    [10, 20, 50]
}

fn default_sma_periods() -> [usize; 4] {
    [10, 20, 50, 100]
}

fn default_rsi_periods() -> [usize; 3] {
    [7, 14, 28]
}

impl Default for IndicatorPeriods {
    fn default() -> Self {
        Self {
            ema: default_ema_periods(),
            sma: default_sma_periods(),
            rsi: default_rsi_periods(),
        }
    }
}

/// The ten indicator series of one candle history, in feature-column order.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    pub ema: [Vec<f64>; 3],
    pub sma: [Vec<f64>; 4],
    pub rsi: [Vec<f64>; 3],
}

impl IndicatorSet {
    /// Compute every configured indicator over `closes`.
    pub fn compute(closes: &[f64], periods: &IndicatorPeriods) -> Self {
        Self {
            ema: periods.ema.map(|p| calculate_ema(closes, p)),
            sma: periods.sma.map(|p| calculate_sma(closes, p)),
            rsi: periods.rsi.map(|p| calculate_rsi(closes, p)),
        }
    }

    /// All ten series in feature-column order (EMA, SMA, RSI).
    pub fn series(&self) -> impl Iterator<Item = &Vec<f64>> {
        self.ema.iter().chain(self.sma.iter()).chain(self.rsi.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_periods_match_feature_layout() {
        let p = IndicatorPeriods::default();
        assert_eq!(p.ema, [10, 20, 50]);
        assert_eq!(p.sma, [10, 20, 50, 100]);
        assert_eq!(p.rsi, [7, 14, 28]);
    }

    #[test]
    fn indicator_set_lengths() {
        let closes: Vec<f64> = (0..200).map(|x| 50.0 + x as f64).collect();
        let set = IndicatorSet::compute(&closes, &IndicatorPeriods::default());
        let lens: Vec<usize> = set.series().map(Vec::len).collect();
        assert_eq!(lens, vec![191, 181, 151, 191, 181, 151, 101, 193, 186, 172]);
    }

    #[test]
    fn periods_deserialise_with_defaults() {
        let p: IndicatorPeriods = serde_json::from_str(r#"{ "rsi": [5, 9, 21] }"#).unwrap();
        assert_eq!(p.rsi, [5, 9, 21]);
        assert_eq!(p.sma, [10, 20, 50, 100]);
    }
}
