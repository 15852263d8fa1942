//! In-memory adapters for builder and cache tests.

use analysis_core::*;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::EngineConfig;

pub fn test_config() -> EngineConfig {
    EngineConfig {
        cache_ttl: Duration::from_secs(300),
        top_n: 10,
        gainers_only: true,
        discovery_limit: 25,
        fetch_concurrency: 4,
        fetch_timeout: Duration::from_secs(10),
        history_lookback_days: 120,
        fallback_symbols: vec!["AAPL".to_string()],
    }
}

/// Steady uptrend of `len` daily bars.
pub fn uptrend(len: usize) -> Result<PriceSeries, MarketDataError> {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let bars = (0..len)
        .map(|i| {
            let close = 50.0 + i as f64 * 0.5;
            PriceBar {
                timestamp: start + ChronoDuration::days(i as i64),
                open: close - 0.2,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 1_000_000.0,
            }
        })
        .collect();
    PriceSeries::new(bars)
}

pub fn snapshot_with_change(ticker: &str, change: f64) -> SymbolSnapshot {
    SymbolSnapshot {
        ticker: ticker.to_string(),
        current_price: 100.0 + change,
        previous_close: 100.0,
        change_absolute: change,
        change_percent: Some(change),
        volume: 0.0,
        indicators: IndicatorSet::default(),
        rank_tier: RankTier::Unavailable,
        suggested_action: SuggestedAction::Watch,
        risk_note: RiskNote {
            factor: RiskFactor::Medium,
            reason: "test".to_string(),
        },
        stop_price: None,
        profit_target: None,
    }
}

pub struct MockSymbols {
    result: Mutex<Result<Vec<String>, MarketDataError>>,
    calls: AtomicUsize,
}

impl MockSymbols {
    pub fn new(tickers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Ok(tickers.iter().map(|t| t.to_string()).collect())),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(err: MarketDataError) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Err(err)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SymbolSource for MockSymbols {
    async fn discover_symbols(&self, limit: usize) -> Result<Vec<String>, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.result.lock().unwrap().clone();
        result.map(|list| list.into_iter().take(limit).collect())
    }
}

#[derive(Clone)]
struct MockTicker {
    quote: Result<Quote, MarketDataError>,
    history: Result<PriceSeries, MarketDataError>,
    delay: Option<Duration>,
}

/// Unknown tickers answer with `DataQuality`.
pub struct MockMarket {
    tickers: Mutex<HashMap<String, MockTicker>>,
    fail_all: Mutex<Option<MarketDataError>>,
    delay: Mutex<Option<Duration>>,
    quote_calls: AtomicUsize,
}

impl MockMarket {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tickers: Mutex::new(HashMap::new()),
            fail_all: Mutex::new(None),
            delay: Mutex::new(None),
            quote_calls: AtomicUsize::new(0),
        })
    }

    pub fn add(&self, ticker: &str, price: f64, previous_close: f64, history_len: usize) {
        let quote = Quote {
            current_price: price,
            previous_close,
            volume: 2_000_000.0,
            open: previous_close,
            high: price,
            low: previous_close,
        };
        self.tickers.lock().unwrap().insert(
            ticker.to_string(),
            MockTicker {
                quote: Ok(quote),
                history: uptrend(history_len),
                delay: None,
            },
        );
    }

    pub fn add_failing(&self, ticker: &str, err: MarketDataError) {
        self.tickers.lock().unwrap().insert(
            ticker.to_string(),
            MockTicker {
                quote: Err(err.clone()),
                history: Err(err),
                delay: None,
            },
        );
    }

    pub fn delay_symbol(&self, ticker: &str, delay: Duration) {
        if let Some(t) = self.tickers.lock().unwrap().get_mut(ticker) {
            t.delay = Some(delay);
        }
    }

    /// Delay applied to every quote call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_all(&self, err: Option<MarketDataError>) {
        *self.fail_all.lock().unwrap() = err;
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, ticker: &str) -> Result<MockTicker, MarketDataError> {
        if let Some(err) = self.fail_all.lock().unwrap().clone() {
            return Err(err);
        }
        self.tickers
            .lock()
            .unwrap()
            .get(ticker)
            .cloned()
            .ok_or_else(|| MarketDataError::DataQuality(format!("unknown ticker {}", ticker)))
    }
}

#[async_trait]
impl MarketDataProvider for MockMarket {
    async fn quote(&self, ticker: &str) -> Result<Quote, MarketDataError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        let global_delay = *self.delay.lock().unwrap();
        if let Some(delay) = global_delay {
            tokio::time::sleep(delay).await;
        }
        let entry = self.lookup(ticker)?;
        if let Some(delay) = entry.delay {
            tokio::time::sleep(delay).await;
        }
        entry.quote
    }

    async fn history(&self, ticker: &str, _lookback_days: u32) -> Result<PriceSeries, MarketDataError> {
        self.lookup(ticker)?.history
    }
}
