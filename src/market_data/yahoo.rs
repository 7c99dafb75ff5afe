// =============================================================================
// Yahoo Finance chart client
// =============================================================================
//
// Daily candles from `GET /v8/finance/chart/{ticker}`. The response carries
// parallel arrays (timestamps in seconds plus one array per OHLCV field).
// Yahoo reports holidays and half-formed sessions as `null` entries; those
// rows are skipped rather than patched.
// =============================================================================

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::candle::{sort_and_dedup, Candle};
use crate::types::DateRange;

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Yahoo Finance chart API client.
#[derive(Debug, Clone)]
pub struct YahooClient {
    base_url: String,
    client: reqwest::Client,
}

impl YahooClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, "https://query1.finance.yahoo.com")
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        debug!(base_url = %base_url, "YahooClient initialised");
        Self { base_url, client }
    }

    /// Fetch daily candles for `ticker` over `range`, oldest first.
    #[instrument(skip(self), name = "yahoo::get_daily_candles")]
    pub async fn get_daily_candles(&self, ticker: &str, range: &DateRange) -> Result<Vec<Candle>> {
        let ticker = ticker.trim().to_uppercase();
        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=history",
            self.base_url,
            ticker,
            range.start_millis() / 1000,
            range.end_millis() / 1000
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /v8/finance/chart request failed")?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .context("failed to read chart response body")?;

        let envelope: ChartEnvelope = serde_json::from_str(&text).with_context(|| {
            format!("failed to parse chart response (HTTP {status})")
        })?;

        let candles = parse_chart(envelope)?;
        debug!(ticker = %ticker, count = candles.len(), "daily candles fetched");
        Ok(candles)
    }
}

/// Turn a chart envelope into sorted, de-duplicated candles.
fn parse_chart(envelope: ChartEnvelope) -> Result<Vec<Candle>> {
    if let Some(err) = envelope.chart.error {
        anyhow::bail!("Yahoo Finance error {}: {}", err.code, err.description);
    }

    let result = envelope
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .context("chart response contains no result")?;

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let mut candles = Vec::with_capacity(result.timestamp.len());
    let mut skipped = 0usize;
    for (idx, &ts) in result.timestamp.iter().enumerate() {
        match (
            value_at(&quote.open, idx),
            value_at(&quote.high, idx),
            value_at(&quote.low, idx),
            value_at(&quote.close, idx),
            value_at(&quote.volume, idx),
        ) {
            (Some(open), Some(high), Some(low), Some(close), Some(volume)) => {
                candles.push(Candle::new(ts * 1000, open, high, low, close, volume));
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(skipped, "dropped chart rows with missing OHLCV fields");
    }

    Ok(sort_and_dedup(candles))
}

fn value_at(column: &[Option<f64>], idx: usize) -> Option<f64> {
    column.get(idx).copied().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(json: &str) -> ChartEnvelope {
        serde_json::from_str(json).expect("valid envelope")
    }

    #[test]
    fn parse_chart_builds_candles_and_skips_nulls() {
        let json = r#"{
            "chart": {
                "result": [{
                    "timestamp": [1700000000, 1700086400, 1700172800],
                    "indicators": { "quote": [{
                        "open":   [10.0, null, 12.0],
                        "high":   [11.0, 12.0, 13.0],
                        "low":    [9.5, 10.5, 11.5],
                        "close":  [10.5, 11.5, 12.5],
                        "volume": [1000, 1100, 1200]
                    }]}
                }],
                "error": null
            }
        }"#;
        let candles = parse_chart(envelope(json)).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].time, 1_700_000_000_000);
        assert!((candles[1].close - 12.5).abs() < 1e-9);
        assert!((candles[1].volume - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn parse_chart_surfaces_provider_error() {
        let json = r#"{
            "chart": {
                "result": null,
                "error": { "code": "Not Found", "description": "No data found, symbol may be delisted" }
            }
        }"#;
        let err = parse_chart(envelope(json)).unwrap_err();
        assert!(err.to_string().contains("symbol may be delisted"));
    }

    #[test]
    fn parse_chart_without_result_fails() {
        let json = r#"{ "chart": { "result": [], "error": null } }"#;
        assert!(parse_chart(envelope(json)).is_err());
    }
}
