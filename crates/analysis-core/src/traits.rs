use async_trait::async_trait;

use crate::{MarketDataError, PriceSeries, Quote};

/// Supplies the candidate ticker universe for one refresh cycle.
#[async_trait]
pub trait SymbolSource: Send + Sync {
    /// Returns at most `limit` tickers, best candidates first.
    async fn discover_symbols(&self, limit: usize) -> Result<Vec<String>, MarketDataError>;
}

/// Per-symbol price data.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn quote(&self, ticker: &str) -> Result<Quote, MarketDataError>;

    /// Daily bars covering roughly the last `lookback_days` calendar days, oldest first.
    async fn history(&self, ticker: &str, lookback_days: u32) -> Result<PriceSeries, MarketDataError>;
}
