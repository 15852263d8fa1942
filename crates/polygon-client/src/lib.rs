use analysis_core::{
    normalize_ticker, MarketDataError, MarketDataProvider, PriceBar, PriceSeries, Quote, SymbolSource,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";

/// How long a ticker from the gainers payload can stand in for its own snapshot request.
const DISCOVERED_SNAPSHOT_TTL: Duration = Duration::from_secs(60);

/// Connection settings for the Polygon REST API
#[derive(Debug, Clone)]
pub struct PolygonConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Requests allowed per rolling minute. Free tier users should set
    /// POLYGON_RATE_LIMIT=5.
    pub rate_limit_per_minute: usize,
    pub request_timeout: Duration,
    /// Pause before retrying a 429 response. Kept below the engine's
    /// per-symbol fetch timeout so a retry can still land.
    pub retry_wait: Duration,
}

impl Default for PolygonConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            rate_limit_per_minute: 500,
            request_timeout: Duration::from_secs(15),
            retry_wait: Duration::from_secs(2),
        }
    }
}

impl PolygonConfig {
    /// Reads `POLYGON_API_KEY`, `POLYGON_BASE_URL`, `POLYGON_RATE_LIMIT`,
    /// `POLYGON_TIMEOUT_SECS` and `POLYGON_RETRY_WAIT_SECS`. A missing key is
    /// not an error here; the client constructor rejects it.
    pub fn from_env() -> Result<Self, MarketDataError> {
        let defaults = Self::default();

        let rate_limit_per_minute = match std::env::var("POLYGON_RATE_LIMIT") {
            Ok(v) => v.trim().parse().map_err(|_| {
                MarketDataError::Configuration(format!("POLYGON_RATE_LIMIT is not a number: {}", v))
            })?,
            Err(_) => defaults.rate_limit_per_minute,
        };

        let request_timeout = match std::env::var("POLYGON_TIMEOUT_SECS") {
            Ok(v) => Duration::from_secs(v.trim().parse().map_err(|_| {
                MarketDataError::Configuration(format!("POLYGON_TIMEOUT_SECS is not a number: {}", v))
            })?),
            Err(_) => defaults.request_timeout,
        };

        let retry_wait = match std::env::var("POLYGON_RETRY_WAIT_SECS") {
            Ok(v) => Duration::from_secs(v.trim().parse().map_err(|_| {
                MarketDataError::Configuration(format!("POLYGON_RETRY_WAIT_SECS is not a number: {}", v))
            })?),
            Err(_) => defaults.retry_wait,
        };

        Ok(Self {
            api_key: std::env::var("POLYGON_API_KEY").ok(),
            base_url: std::env::var("POLYGON_BASE_URL").unwrap_or(defaults.base_url),
            rate_limit_per_minute,
            request_timeout,
            retry_wait,
        })
    }
}

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request leaves the window
            let wait = ts
                .front()
                .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
                .unwrap_or_default();
            drop(ts);
            tokio::time::sleep(wait).await;
        }
    }
}

pub struct PolygonClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
    retry_wait: Duration,
    /// Snapshots from the last gainers call, keyed by normalized ticker
    discovered: Mutex<HashMap<String, (Instant, SnapshotTicker)>>,
}

impl PolygonClient {
    /// Fails with `Configuration` when no API key is set.
    pub fn new(config: PolygonConfig) -> Result<Self, MarketDataError> {
        let api_key = config
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| MarketDataError::Configuration("POLYGON_API_KEY is not set".to_string()))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MarketDataError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            rate_limiter: RateLimiter::new(config.rate_limit_per_minute, Duration::from_secs(60)),
            retry_wait: config.retry_wait,
            discovered: Mutex::new(HashMap::new()),
        })
    }

    /// Replaces the remembered gainers snapshots and returns the first
    /// `limit` usable tickers in Polygon's order.
    async fn remember_gainers(&self, gainers: Vec<SnapshotTicker>, limit: usize) -> Vec<String> {
        let now = Instant::now();
        let mut discovered = self.discovered.lock().await;
        discovered.clear();

        let mut symbols = Vec::new();
        for snapshot in gainers {
            if symbols.len() == limit {
                break;
            }
            let Some(ticker) = normalize_ticker(&snapshot.ticker) else {
                continue;
            };
            if discovered.contains_key(&ticker) {
                continue;
            }
            discovered.insert(ticker.clone(), (now, snapshot));
            symbols.push(ticker);
        }
        symbols
    }

    /// Removes and returns a remembered snapshot that is still recent enough.
    async fn take_discovered(&self, ticker: &str) -> Option<SnapshotTicker> {
        let (seen_at, snapshot) = self.discovered.lock().await.remove(ticker)?;
        (seen_at.elapsed() < DISCOVERED_SNAPSHOT_TTL).then_some(snapshot)
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, MarketDataError> {
        let request = builder
            .query(&[("apiKey", self.api_key.as_str())])
            .build()
            .map_err(|e| MarketDataError::TransientUpstream(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| MarketDataError::TransientUpstream("Cannot clone request".to_string()))?;
            let response = self.client.execute(req_clone).await.map_err(transport_error)?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            tracing::warn!(
                "Polygon 429 rate limited, waiting {}s before retry {}/3",
                self.retry_wait.as_secs(),
                attempt + 1
            );
            tokio::time::sleep(self.retry_wait).await;
        }

        Err(MarketDataError::TransientUpstream(
            "Rate limited by Polygon after 3 retries".to_string(),
        ))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        builder: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<T, MarketDataError> {
        let response = self.send_request(builder).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, context, &body));
        }

        response
            .json()
            .await
            .map_err(|e| MarketDataError::DataQuality(format!("{}: malformed response: {}", context, e)))
    }

    /// Today's top gaining US stocks, as ranked by Polygon
    pub async fn get_gainers(&self) -> Result<Vec<SnapshotTicker>, MarketDataError> {
        let url = format!("{}/v2/snapshot/locale/us/markets/stocks/gainers", self.base_url);
        let body: GainersResponse = self.get_json(self.client.get(&url), "Gainers").await?;
        Ok(body.tickers)
    }

    /// Get snapshot for a ticker (near-real-time last trade, today's OHLCV, prev day)
    pub async fn get_snapshot(&self, symbol: &str) -> Result<SnapshotTicker, MarketDataError> {
        let url = format!(
            "{}/v2/snapshot/locale/us/markets/stocks/tickers/{}",
            self.base_url, symbol
        );
        let body: SnapshotResponse = self.get_json(self.client.get(&url), "Snapshot").await?;
        body.ticker
            .ok_or_else(|| MarketDataError::DataQuality(format!("no snapshot for {}", symbol)))
    }

    /// Get aggregates (bars) for a symbol, oldest first
    pub async fn get_aggregates(
        &self,
        symbol: &str,
        multiplier: u32,
        timespan: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>, MarketDataError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            self.base_url,
            symbol,
            multiplier,
            timespan,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let body: AggregateResponse = self
            .get_json(
                self.client
                    .get(&url)
                    .query(&[("adjusted", "true"), ("sort", "asc"), ("limit", "50000")]),
                "Aggregates",
            )
            .await?;

        body.results.into_iter().map(AggregateResult::into_bar).collect()
    }
}

fn transport_error(e: reqwest::Error) -> MarketDataError {
    if e.is_timeout() {
        MarketDataError::TransientUpstream(format!("request timed out: {}", e))
    } else {
        MarketDataError::TransientUpstream(e.to_string())
    }
}

/// Maps a non-success HTTP status to the error taxonomy.
fn status_error(status: StatusCode, context: &str, body: &str) -> MarketDataError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MarketDataError::Configuration(format!(
            "{} HTTP {}: API key rejected",
            context, status
        )),
        StatusCode::NOT_FOUND => MarketDataError::DataQuality(format!("{} HTTP {}: {}", context, status, body)),
        _ => MarketDataError::TransientUpstream(format!("{} HTTP {}: {}", context, status, body)),
    }
}

#[async_trait]
impl SymbolSource for PolygonClient {
    async fn discover_symbols(&self, limit: usize) -> Result<Vec<String>, MarketDataError> {
        let gainers = self.get_gainers().await?;
        let symbols = self.remember_gainers(gainers, limit).await;

        tracing::info!("Discovered {} gainers from Polygon", symbols.len());
        Ok(symbols)
    }
}

#[async_trait]
impl MarketDataProvider for PolygonClient {
    async fn quote(&self, ticker: &str) -> Result<Quote, MarketDataError> {
        if let Some(snapshot) = self.take_discovered(ticker).await {
            match snapshot.to_quote(ticker) {
                Ok(quote) => return Ok(quote),
                Err(e) => tracing::debug!("Gainers snapshot unusable, refetching: {}", e),
            }
        }
        let snapshot = self.get_snapshot(ticker).await?;
        snapshot.to_quote(ticker)
    }

    async fn history(&self, ticker: &str, lookback_days: u32) -> Result<PriceSeries, MarketDataError> {
        let to = Utc::now();
        let from = to - ChronoDuration::days(i64::from(lookback_days));
        let bars = self.get_aggregates(ticker, 1, "day", from, to).await?;
        PriceSeries::new(bars)
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct GainersResponse {
    #[serde(default)]
    tickers: Vec<SnapshotTicker>,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    ticker: Option<SnapshotTicker>,
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp (ms)
    o: f64, // open
    h: f64, // high
    l: f64, // low
    c: f64, // close
    #[serde(default)]
    v: f64, // volume
}

impl AggregateResult {
    fn into_bar(self) -> Result<PriceBar, MarketDataError> {
        let timestamp = DateTime::from_timestamp_millis(self.t)
            .ok_or_else(|| MarketDataError::DataQuality(format!("invalid bar timestamp {}", self.t)))?;
        Ok(PriceBar {
            timestamp,
            open: self.o,
            high: self.h,
            low: self.l,
            close: self.c,
            volume: self.v,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotTicker {
    #[serde(default)]
    pub ticker: String,
    pub day: Option<SnapshotDay>,
    #[serde(rename = "lastTrade")]
    pub last_trade: Option<SnapshotLastTrade>,
    #[serde(rename = "prevDay")]
    pub prev_day: Option<SnapshotDay>,
    #[serde(rename = "todaysChangePerc")]
    pub todays_change_perc: Option<f64>,
}

impl SnapshotTicker {
    /// Last trade price, else today's close. Zero prices count as missing
    /// because Polygon zero-fills the day bar before the open.
    pub fn current_price(&self) -> Option<f64> {
        let positive = |p: Option<f64>| p.filter(|v| v.is_finite() && *v > 0.0);
        positive(self.last_trade.as_ref().and_then(|t| t.p))
            .or_else(|| positive(self.day.as_ref().and_then(|d| d.c)))
    }

    pub fn to_quote(&self, ticker: &str) -> Result<Quote, MarketDataError> {
        let current_price = self
            .current_price()
            .ok_or_else(|| MarketDataError::DataQuality(format!("{}: no current price", ticker)))?;
        let previous_close = self
            .prev_day
            .as_ref()
            .and_then(|d| d.c)
            .filter(|c| c.is_finite())
            .ok_or_else(|| MarketDataError::DataQuality(format!("{}: no previous close", ticker)))?;

        let day = self.day.as_ref();
        let day_field = |f: fn(&SnapshotDay) -> Option<f64>| {
            day.and_then(f).filter(|v| v.is_finite() && *v > 0.0).unwrap_or(current_price)
        };

        Ok(Quote {
            current_price,
            previous_close,
            volume: day.and_then(|d| d.v).filter(|v| v.is_finite()).unwrap_or(0.0),
            open: day_field(|d| d.o),
            high: day_field(|d| d.h),
            low: day_field(|d| d.l),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDay {
    pub o: Option<f64>,
    pub h: Option<f64>,
    pub l: Option<f64>,
    pub c: Option<f64>,
    pub v: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotLastTrade {
    pub p: Option<f64>,
    pub s: Option<i64>,
    pub t: Option<i64>,
}
