// =============================================================================
// Binance public klines client
// =============================================================================
//
// Daily candles for crypto pairs from `GET /api/v3/klines`. The endpoint is
// public, so no API key or signature is needed. A single request returns at
// most 1000 rows; longer ranges are paged by advancing `startTime`.
// =============================================================================

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use super::candle::{sort_and_dedup, Candle};
use crate::types::DateRange;

/// Maximum rows Binance returns per klines request.
const KLINES_PAGE_LIMIT: usize = 1000;

/// Binance REST client restricted to public market data.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, "https://api.binance.com")
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        debug!(base_url = %base_url, "BinanceClient initialised");
        Self { base_url, client }
    }

    /// GET /api/v3/klines with `interval=1d`, paged over `range`.
    ///
    /// Array indices of each kline row:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime, ...
    #[instrument(skip(self), name = "binance::get_daily_klines")]
    pub async fn get_daily_klines(&self, symbol: &str, range: &DateRange) -> Result<Vec<Candle>> {
        let symbol = symbol.trim().to_uppercase();
        let end_time = range.end_millis();
        let mut start_time = range.start_millis();
        let mut candles = Vec::new();

        loop {
            let url = format!(
                "{}/api/v3/klines?symbol={}&interval=1d&startTime={}&endTime={}&limit={}",
                self.base_url, symbol, start_time, end_time, KLINES_PAGE_LIMIT
            );

            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .context("GET /api/v3/klines request failed")?;

            let status = resp.status();
            let body: serde_json::Value = resp
                .json()
                .await
                .context("failed to parse klines response")?;

            if !status.is_success() {
                let msg = body["msg"].as_str().unwrap_or("unknown error");
                anyhow::bail!("Binance GET /api/v3/klines returned {status}: {msg}");
            }

            let page = parse_klines(&body)?;
            let page_len = page.len();
            let last_open = page.last().map(|c| c.time);
            candles.extend(page);

            match last_open {
                Some(t) if page_len == KLINES_PAGE_LIMIT && t < end_time => start_time = t + 1,
                _ => break,
            }
        }

        let candles = sort_and_dedup(candles);
        debug!(symbol = %symbol, count = candles.len(), "daily klines fetched");
        Ok(candles)
    }
}

/// Parse Binance's array-of-arrays klines payload.
fn parse_klines(body: &serde_json::Value) -> Result<Vec<Candle>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut candles = Vec::with_capacity(raw.len());
    for entry in raw {
        let arr = entry.as_array().context("kline entry is not an array")?;

        if arr.len() < 6 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        let time = arr[0].as_i64().context("kline open time is not an integer")?;
        candles.push(Candle::new(
            time,
            parse_str_f64(&arr[1])?,
            parse_str_f64(&arr[2])?,
            parse_str_f64(&arr[3])?,
            parse_str_f64(&arr[4])?,
            parse_str_f64(&arr[5])?,
        ));
    }
    Ok(candles)
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
