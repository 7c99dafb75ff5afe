// =============================================================================
// Relative Strength Index (RSI), simple-average variant
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes.
//
// Step 1: Compute price changes (deltas) from consecutive closes (n - 1).
// Step 2: For every window of `period` consecutive deltas, average the gains
//          and the absolute losses over `period`. Each window is averaged
//          independently; there is no Wilder smoothing between windows.
// Step 3: avg_loss == 0  => RSI = 100 (saturates, even on a flat window)
//          otherwise       => RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//
// Output length is n - period.
// =============================================================================

/// Compute the full RSI series for the given `closes` and `period`.
///
/// Element `j` covers deltas `j ..= j + period - 1`, i.e. closes
/// `j ..= j + period`.
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - `closes.len() < period + 1` => empty vec (need at least `period` deltas)
/// - A window without losses yields exactly 100.0.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    // --- Compute price deltas ------------------------------------------------
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let period_f = period as f64;

    deltas
        .windows(period)
        .map(|window| {
            let (gains, losses) = window.iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
                if d > 0.0 {
                    (g + d, l)
                } else if d < 0.0 {
                    (g, l - d)
                } else if d == 0.0 {
                    (g, l)
                } else {
                    (f64::NAN, f64::NAN)
                }
            });
            rsi_from_averages(gains / period_f, losses / period_f)
        })
        .collect()
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Convert average gain / average loss into an RSI value.
///
/// Zero average loss saturates at 100.0. Non-finite averages pass through as
/// NaN so that the feature cleaning step can drop the row.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
