use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single daily OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Session open time, epoch milliseconds (UTC).
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Closing prices of `candles`, oldest first.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Sort candles by time and drop repeated timestamps, keeping the last
/// occurrence (providers append the live session after the closed one).
pub fn sort_and_dedup(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.time);
    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match out.last_mut() {
            Some(last) if last.time == candle.time => *last = candle,
            _ => out.push(candle),
        }
    }
    out
}

/// Check the provider contract: non-empty, strictly ascending timestamps.
pub fn validate_series(candles: &[Candle]) -> Result<(), ForecastError> {
    if candles.is_empty() {
        return Err(ForecastError::data_fetch(
            "no candles returned; the ticker may be invalid",
        ));
    }

    if let Some(pair) = candles.windows(2).find(|w| w[1].time <= w[0].time) {
        let message = if pair[1].time == pair[0].time {
            format!("duplicate candle timestamp {}", pair[1].time)
        } else {
            format!(
                "candles out of order: {} follows {}",
                pair[1].time, pair[0].time
            )
        };
        return Err(ForecastError::data_fetch(message));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
