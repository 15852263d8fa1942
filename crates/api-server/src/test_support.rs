use analysis_core::{MarketDataError, MarketDataProvider, PriceBar, PriceSeries, Quote, SymbolSource};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use chrono::{Duration, TimeZone, Utc};
use snapshot_engine::{EngineConfig, SnapshotBuilder, SnapshotCache};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

use crate::{build_router, config::ServerConfig, AppState, GainersBackend};

/// (ticker, price, previous close, history length)
pub type Fixture = (&'static str, f64, f64, usize);

struct FixtureMarket {
    tickers: HashMap<String, (f64, f64, usize)>,
    fail: bool,
}

impl FixtureMarket {
    fn lookup(&self, ticker: &str) -> Result<(f64, f64, usize), MarketDataError> {
        self.tickers
            .get(ticker)
            .copied()
            .ok_or_else(|| MarketDataError::DataQuality(format!("unknown ticker {}", ticker)))
    }
}

#[async_trait]
impl SymbolSource for FixtureMarket {
    async fn discover_symbols(&self, limit: usize) -> Result<Vec<String>, MarketDataError> {
        let mut symbols: Vec<String> = self.tickers.keys().cloned().collect();
        symbols.sort();
        symbols.truncate(limit);
        Ok(symbols)
    }
}

#[async_trait]
impl MarketDataProvider for FixtureMarket {
    async fn quote(&self, ticker: &str) -> Result<Quote, MarketDataError> {
        if self.fail {
            return Err(MarketDataError::TransientUpstream("connection reset".to_string()));
        }
        let (price, prev, _) = self.lookup(ticker)?;
        Ok(Quote {
            current_price: price,
            previous_close: prev,
            volume: 1_500_000.0,
            open: prev,
            high: price,
            low: prev,
        })
    }

    async fn history(&self, ticker: &str, _lookback_days: u32) -> Result<PriceSeries, MarketDataError> {
        if self.fail {
            return Err(MarketDataError::TransientUpstream("connection reset".to_string()));
        }
        let (_, _, len) = self.lookup(ticker)?;
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bars = (0..len)
            .map(|i| {
                let close = 40.0 + i as f64 * 0.4;
                PriceBar {
                    timestamp: start + Duration::days(i as i64),
                    open: close,
                    high: close + 0.6,
                    low: close - 0.6,
                    close,
                    volume: 900_000.0,
                }
            })
            .collect();
        PriceSeries::new(bars)
    }
}

fn app_with(market: FixtureMarket) -> Router {
    let market = Arc::new(market);
    let config = EngineConfig {
        fallback_symbols: vec!["SPY".to_string()],
        ..Default::default()
    };
    let cache = SnapshotCache::new(SnapshotBuilder::new(market.clone(), market, config));
    let state = AppState {
        gainers: GainersBackend::Ready(cache),
    };
    build_router(state, &ServerConfig::default())
}

pub fn ready_app(fixtures: &[Fixture]) -> Router {
    app_with(FixtureMarket {
        tickers: fixtures
            .iter()
            .map(|(t, price, prev, len)| (t.to_string(), (*price, *prev, *len)))
            .collect(),
        fail: false,
    })
}

pub fn failing_app() -> Router {
    app_with(FixtureMarket {
        tickers: HashMap::from([("A".to_string(), (105.0, 100.0, 60))]),
        fail: true,
    })
}

pub async fn send(app: Router, uri: &str) -> (StatusCode, HeaderMap, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, headers, body)
}
