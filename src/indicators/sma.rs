// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// Arithmetic mean of every window of `period` consecutive closes. The output
// element `j` covers closes `j ..= j + period - 1`.
// =============================================================================

/// Compute the SMA series for `closes` and look-back `period`.
///
/// Output length is `closes.len() - period + 1`. Returns an empty `Vec` when
/// `period == 0` or the input is shorter than `period`.
pub fn calculate_sma(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let divisor = period as f64;
    closes
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / divisor)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_empty_and_short_input() {
        assert!(calculate_sma(&[], 3).is_empty());
        assert!(calculate_sma(&[1.0, 2.0], 3).is_empty());
        assert!(calculate_sma(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn sma_length_is_n_minus_p_plus_one() {
        let closes: Vec<f64> = (1..=50).map(|x| x as f64).collect();
        for period in [1, 5, 10, 50] {
            assert_eq!(calculate_sma(&closes, period).len(), 50 - period + 1);
        }
    }

    #[test]
    fn sma_known_values() {
        let sma = calculate_sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(sma, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn sma_period_one_is_identity() {
        let closes = vec![3.5, 1.25, 9.0];
        assert_eq!(calculate_sma(&closes, 1), closes);
    }
}
