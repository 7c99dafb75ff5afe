// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = (close_t - EMA_{t-1}) * multiplier + EMA_{t-1}
//
// The very first EMA value is seeded with the SMA of the first `period` closes
// and is part of the output, so the series has `n - period + 1` elements.
// =============================================================================

/// Compute the EMA series for the given `closes` slice and look-back `period`.
///
/// Returns an empty `Vec` when the input is too short or the period is zero.
/// Each output element corresponds to a close starting at index `period - 1`.
///
/// A non-finite close poisons every later value. The series is never
/// truncated; the feature cleaning step drops the affected rows.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;

    // Seed: SMA of the first `period` values.
    let seed: f64 = closes[..period].iter().sum::<f64>() / period as f64;

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(seed);

    let mut prev_ema = seed;
    for &close in &closes[period..] {
        let ema = (close - prev_ema) * multiplier + prev_ema;
        result.push(ema);
        prev_ema = ema;
    }

    result
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::sma::calculate_sma;

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_period_zero() {
        assert!(calculate_ema(&[1.0, 2.0, 3.0], 0).is_empty());
    }

    #[test]
    fn ema_insufficient_data() {
        assert!(calculate_ema(&[1.0, 2.0], 5).is_empty());
    }

    #[test]
    fn ema_period_equals_length() {
        let closes = vec![2.0, 4.0, 6.0];
        let ema = calculate_ema(&closes, 3);
        assert_eq!(ema.len(), 1);
        // Should be the SMA = (2+4+6)/3 = 4.0
        assert!((ema[0] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn ema_length_is_n_minus_p_plus_one() {
        let closes: Vec<f64> = (1..=120).map(|x| (x as f64).sqrt()).collect();
        for period in [10, 20, 50] {
            assert_eq!(calculate_ema(&closes, period).len(), 120 - period + 1);
        }
    }

    #[test]
    fn ema_seed_equals_sma_of_first_period() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89,
        ];
        let ema = calculate_ema(&closes, 10);
        let sma = calculate_sma(&closes, 10);
        assert!((ema[0] - sma[0]).abs() < 1e-12);
    }

    #[test]
    fn ema_known_values() {
        // 5-period EMA of [1,2,3,4,5,6,7,8,9,10]
        // SMA of first 5 = 3.0, multiplier = 2/6 = 1/3
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let ema = calculate_ema(&closes, 5);
        assert_eq!(ema.len(), 6); // indices 4..9

        let mult = 2.0 / 6.0;
        let mut expected = 3.0; // SMA seed
        let mut expected_vec = vec![expected];
        for &c in &closes[5..] {
            expected = (c - expected) * mult + expected;
            expected_vec.push(expected);
        }
        for (a, b) in ema.iter().zip(expected_vec.iter()) {
            assert!((a - b).abs() < 1e-10, "got {a}, expected {b}");
        }
    }

    #[test]
    fn ema_keeps_length_when_input_has_nan() {
        let closes = vec![1.0, 2.0, 3.0, f64::NAN, 5.0];
        let ema = calculate_ema(&closes, 3);
        assert_eq!(ema.len(), 3);
        assert!(ema[0].is_finite());
        assert!(ema[1].is_nan());
        assert!(ema[2].is_nan());
    }
}
