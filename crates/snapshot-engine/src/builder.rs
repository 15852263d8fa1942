//! One refresh cycle: discover symbols, fetch and compute per symbol, then
//! filter, sort and truncate to the top N.

use analysis_core::{
    normalize_ticker, price_change, MarketDataError, MarketDataProvider, PriceSeries, Quote, SymbolSnapshot,
    SymbolSource,
};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use technical_analysis::{classify, IndicatorEngine};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    FetchingSymbols,
    FetchingData,
    Computing,
    Filtering,
    Sorting,
    Done,
    Failed,
}

/// Why a cycle produced no snapshot at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefreshFailure {
    #[error("Upstream unavailable: {attempted} symbols attempted, {reason}")]
    UpstreamUnavailable { attempted: usize, reason: String },

    #[error("Misconfigured: {0}")]
    Misconfigured(String),
}

/// Per-cycle counters, logged when the cycle ends
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub discovered: usize,
    pub fallback_used: bool,
    pub fetched: usize,
    pub dropped: usize,
    pub filtered_out: usize,
    pub returned: usize,
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub snapshots: Vec<SymbolSnapshot>,
    pub summary: RefreshSummary,
}

pub struct SnapshotBuilder {
    symbol_source: Arc<dyn SymbolSource>,
    market_data: Arc<dyn MarketDataProvider>,
    engine: IndicatorEngine,
    config: EngineConfig,
}

impl SnapshotBuilder {
    pub fn new(
        symbol_source: Arc<dyn SymbolSource>,
        market_data: Arc<dyn MarketDataProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            symbol_source,
            market_data,
            engine: IndicatorEngine::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs one full cycle. Per-symbol errors never fail the cycle unless
    /// they say the deployment is misconfigured, or nothing was fetched and
    /// at least one symbol hit an upstream error.
    pub async fn build(&self) -> Result<RefreshOutcome, RefreshFailure> {
        transition(RefreshPhase::Idle);
        let result = self.run_cycle().await;
        match &result {
            Ok(outcome) => {
                transition(RefreshPhase::Done);
                let s = &outcome.summary;
                tracing::info!(
                    discovered = s.discovered,
                    fallback_used = s.fallback_used,
                    fetched = s.fetched,
                    dropped = s.dropped,
                    filtered_out = s.filtered_out,
                    returned = s.returned,
                    "Snapshot refresh complete"
                );
            }
            Err(failure) => {
                transition(RefreshPhase::Failed);
                tracing::warn!("Snapshot refresh failed: {}", failure);
            }
        }
        result
    }

    async fn run_cycle(&self) -> Result<RefreshOutcome, RefreshFailure> {
        let mut summary = RefreshSummary::default();

        transition(RefreshPhase::FetchingSymbols);
        let (symbols, fallback_used) = self.discover().await?;
        summary.discovered = symbols.len();
        summary.fallback_used = fallback_used;

        transition(RefreshPhase::FetchingData);
        let attempted = symbols.len();
        let semaphore = Semaphore::new(self.config.fetch_concurrency.max(1));
        let results: Vec<(String, Result<(Quote, PriceSeries), MarketDataError>)> =
            join_all(symbols.into_iter().map(|ticker| {
                let semaphore = &semaphore;
                async move {
                    let result = match semaphore.acquire().await {
                        Ok(_permit) => self.fetch_symbol(&ticker).await,
                        Err(e) => Err(MarketDataError::TransientUpstream(e.to_string())),
                    };
                    (ticker, result)
                }
            }))
            .await;

        let mut fetched = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (ticker, result) in results {
            match result {
                Ok(data) => fetched.push((ticker, data)),
                Err(e) => {
                    tracing::warn!("Dropping {}: {}", ticker, e);
                    failures.push(e);
                }
            }
        }
        summary.fetched = fetched.len();
        summary.dropped = failures.len();

        if let Some(e) = failures.iter().find(|e| e.is_configuration()) {
            return Err(RefreshFailure::Misconfigured(e.to_string()));
        }
        if fetched.is_empty() {
            if let Some(e) = failures.iter().find(|e| e.is_transient()) {
                return Err(RefreshFailure::UpstreamUnavailable {
                    attempted,
                    reason: e.to_string(),
                });
            }
        }

        transition(RefreshPhase::Computing);
        let mut snapshots: Vec<SymbolSnapshot> = fetched
            .into_iter()
            .map(|(ticker, (quote, series))| self.build_snapshot(ticker, &quote, &series))
            .collect();

        transition(RefreshPhase::Filtering);
        if self.config.gainers_only {
            let before = snapshots.len();
            snapshots.retain(|s| s.change_absolute > 0.0);
            summary.filtered_out = before - snapshots.len();
        }

        transition(RefreshPhase::Sorting);
        sort_snapshots(&mut snapshots);
        snapshots.truncate(self.config.top_n);
        summary.returned = snapshots.len();

        Ok(RefreshOutcome { snapshots, summary })
    }

    /// Discovered tickers, or the fallback list when discovery fails, times
    /// out or returns nothing usable.
    async fn discover(&self) -> Result<(Vec<String>, bool), RefreshFailure> {
        let limit = self.config.discovery_limit;

        let discovered = match timeout(self.config.fetch_timeout, self.symbol_source.discover_symbols(limit)).await
        {
            Ok(Ok(list)) => dedup_tickers(list, limit),
            Ok(Err(e)) if e.is_configuration() => return Err(RefreshFailure::Misconfigured(e.to_string())),
            Ok(Err(e)) => {
                tracing::warn!("Symbol discovery failed, using fallback list: {}", e);
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    "Symbol discovery timed out after {}s, using fallback list",
                    self.config.fetch_timeout.as_secs()
                );
                Vec::new()
            }
        };

        if !discovered.is_empty() {
            return Ok((discovered, false));
        }

        let fallback = dedup_tickers(self.config.fallback_symbols.clone(), limit);
        if fallback.is_empty() {
            return Err(RefreshFailure::UpstreamUnavailable {
                attempted: 0,
                reason: "no symbols discovered and the fallback list is empty".to_string(),
            });
        }
        Ok((fallback, true))
    }

    async fn fetch_symbol(&self, ticker: &str) -> Result<(Quote, PriceSeries), MarketDataError> {
        let fetch = async {
            let (quote, history) = tokio::join!(
                self.market_data.quote(ticker),
                self.market_data.history(ticker, self.config.history_lookback_days)
            );
            if let Err(e) = &history {
                if e.is_configuration() {
                    return Err(e.clone());
                }
            }
            let quote = quote?;
            validate_quote(&quote)?;
            Ok((quote, history?))
        };

        timeout(self.config.fetch_timeout, fetch).await.map_err(|_| {
            MarketDataError::TransientUpstream(format!(
                "fetch timed out after {}s",
                self.config.fetch_timeout.as_secs()
            ))
        })?
    }

    fn build_snapshot(&self, ticker: String, quote: &Quote, series: &PriceSeries) -> SymbolSnapshot {
        let indicators = self.engine.compute(series);
        let (change_absolute, change_percent) = price_change(quote.current_price, quote.previous_close);
        let classification = classify(quote.current_price, &indicators);

        SymbolSnapshot {
            ticker,
            current_price: quote.current_price,
            previous_close: quote.previous_close,
            change_absolute,
            change_percent,
            volume: quote.volume,
            indicators,
            rank_tier: classification.rank_tier,
            suggested_action: classification.suggested_action,
            risk_note: classification.risk_note,
            stop_price: classification.exit_levels.map(|l| l.stop_price),
            profit_target: classification.exit_levels.map(|l| l.profit_target),
        }
    }
}

fn transition(phase: RefreshPhase) {
    tracing::debug!(?phase, "refresh phase");
}

fn validate_quote(quote: &Quote) -> Result<(), MarketDataError> {
    if !quote.current_price.is_finite() || quote.current_price <= 0.0 {
        return Err(MarketDataError::DataQuality(format!(
            "invalid current price {}",
            quote.current_price
        )));
    }
    if !quote.previous_close.is_finite() || quote.previous_close < 0.0 {
        return Err(MarketDataError::DataQuality(format!(
            "invalid previous close {}",
            quote.previous_close
        )));
    }
    if !quote.volume.is_finite() || quote.volume < 0.0 {
        return Err(MarketDataError::DataQuality(format!("invalid volume {}", quote.volume)));
    }
    Ok(())
}

/// Normalizes tickers, keeps the first occurrence of each and stops at `limit`.
pub fn dedup_tickers(raw: Vec<String>, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|t| normalize_ticker(t))
        .filter(|t| seen.insert(t.clone()))
        .take(limit)
        .collect()
}

/// Biggest absolute gain first; equal gains order by ticker.
pub fn sort_snapshots(snapshots: &mut [SymbolSnapshot]) {
    snapshots.sort_by(|a, b| {
        b.change_absolute
            .total_cmp(&a.change_absolute)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
}
