// =============================================================================
// Shared types used across the forecaster
// =============================================================================

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Which market data source to fetch daily candles from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Yahoo Finance chart API (equities, ETFs, indices).
    Yahoo,
    /// Binance public klines (crypto pairs such as BTCUSDT).
    Binance,
}

impl Default for ProviderKind {
    fn default() -> Self {
        Self::Yahoo
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yahoo => write!(f, "yahoo"),
            Self::Binance => write!(f, "binance"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yahoo" => Ok(Self::Yahoo),
            "binance" => Ok(Self::Binance),
            other => anyhow::bail!("unknown provider '{other}' (expected yahoo or binance)"),
        }
    }
}

/// Inclusive calendar date range for a history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The `days` calendar days ending today (UTC).
    pub fn last_days(days: u32) -> Self {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(i64::from(days));
        Self { start, end }
    }

    /// Start of the range as epoch milliseconds (midnight UTC).
    pub fn start_millis(&self) -> i64 {
        self.start.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
    }

    /// End of the range as epoch milliseconds (last millisecond of the day).
    pub fn end_millis(&self) -> i64 {
        (self.end + Duration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp_millis()
            - 1
    }
}
