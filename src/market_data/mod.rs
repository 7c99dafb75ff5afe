pub mod binance;
pub mod candle;
pub mod yahoo;

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

pub use binance::BinanceClient;
pub use candle::{closes, validate_series, Candle};
pub use yahoo::YahooClient;

use crate::types::{DateRange, ProviderKind};

/// Browser-like user agent; Yahoo answers 429 to the reqwest default.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) trend-forecaster/1.0";

/// Source of daily candles for one ticker.
#[derive(Debug, Clone)]
pub enum MarketDataProvider {
    Yahoo(YahooClient),
    Binance(BinanceClient),
}

impl MarketDataProvider {
    /// Build a provider of the given kind sharing one HTTP client.
    pub fn new(kind: ProviderKind) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .context("failed to build HTTP client")?;

        info!(provider = %kind, "market data provider ready");
        Ok(match kind {
            ProviderKind::Yahoo => Self::Yahoo(YahooClient::new(client)),
            ProviderKind::Binance => Self::Binance(BinanceClient::new(client)),
        })
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Yahoo(_) => ProviderKind::Yahoo,
            Self::Binance(_) => ProviderKind::Binance,
        }
    }

    /// Daily candles for `ticker` over `range`, ascending and de-duplicated.
    pub async fn fetch_daily(&self, ticker: &str, range: &DateRange) -> Result<Vec<Candle>> {
        match self {
            Self::Yahoo(client) => client.get_daily_candles(ticker, range).await,
            Self::Binance(client) => client.get_daily_klines(ticker, range).await,
        }
    }
}
