use analysis_core::normalize_ticker;
use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

/// Liquid large caps used when gainer discovery fails or comes back empty.
pub const DEFAULT_FALLBACK_SYMBOLS: &[&str] = &[
    "AAPL", "MSFT", "NVDA", "AMZN", "GOOGL", "META", "TSLA", "AMD", "NFLX", "JPM",
];

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache_ttl: Duration,       // 300s
    pub top_n: usize,              // 10
    pub gainers_only: bool,        // drop non-positive movers
    pub discovery_limit: usize,    // 25
    pub fetch_concurrency: usize,  // 4 symbols in flight
    pub fetch_timeout: Duration,   // per discovery call and per symbol
    pub history_lookback_days: u32, // 120 calendar days covers EMA50 + MACD
    pub fallback_symbols: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            top_n: 10,
            gainers_only: true,
            discovery_limit: 25,
            fetch_concurrency: 4,
            fetch_timeout: Duration::from_secs(10),
            history_lookback_days: 120,
            fallback_symbols: DEFAULT_FALLBACK_SYMBOLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            cache_ttl: Duration::from_secs(
                env::var("GAINERS_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| defaults.cache_ttl.as_secs().to_string())
                    .parse()
                    .context("GAINERS_CACHE_TTL_SECS must be a whole number of seconds")?,
            ),
            top_n: env::var("GAINERS_TOP_N")
                .unwrap_or_else(|_| defaults.top_n.to_string())
                .parse()
                .context("GAINERS_TOP_N must be a positive integer")?,
            gainers_only: env::var("GAINERS_ONLY")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("GAINERS_ONLY must be true or false")?,
            discovery_limit: env::var("GAINERS_DISCOVERY_LIMIT")
                .unwrap_or_else(|_| defaults.discovery_limit.to_string())
                .parse()
                .context("GAINERS_DISCOVERY_LIMIT must be a positive integer")?,
            fetch_concurrency: env::var("GAINERS_FETCH_CONCURRENCY")
                .unwrap_or_else(|_| defaults.fetch_concurrency.to_string())
                .parse()
                .context("GAINERS_FETCH_CONCURRENCY must be a positive integer")?,
            fetch_timeout: Duration::from_secs(
                env::var("GAINERS_FETCH_TIMEOUT_SECS")
                    .unwrap_or_else(|_| defaults.fetch_timeout.as_secs().to_string())
                    .parse()
                    .context("GAINERS_FETCH_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            history_lookback_days: env::var("GAINERS_LOOKBACK_DAYS")
                .unwrap_or_else(|_| defaults.history_lookback_days.to_string())
                .parse()
                .context("GAINERS_LOOKBACK_DAYS must be a positive integer")?,
            fallback_symbols: match env::var("GAINERS_FALLBACK_SYMBOLS") {
                Ok(list) => parse_symbol_list(&list),
                Err(_) => defaults.fallback_symbols,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            bail!("top_n must be at least 1");
        }
        if self.discovery_limit == 0 {
            bail!("discovery_limit must be at least 1");
        }
        if self.fetch_concurrency == 0 {
            bail!("fetch_concurrency must be at least 1");
        }
        if self.fetch_timeout.is_zero() {
            bail!("fetch_timeout must be greater than zero");
        }
        if self.cache_ttl.is_zero() {
            bail!("cache_ttl must be greater than zero");
        }
        if self.fallback_symbols.iter().all(|s| normalize_ticker(s).is_none()) {
            bail!("fallback symbol list must not be empty");
        }
        Ok(())
    }
}

/// Comma-separated tickers, normalized. Blank entries are skipped.
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.split(',').filter_map(normalize_ticker).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.top_n, 10);
        assert!(config.gainers_only);
    }

    #[test]
    fn test_validate_rejects_zero_top_n() {
        let config = EngineConfig {
            top_n: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_fallback() {
        let config = EngineConfig {
            fallback_symbols: vec![" ".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_symbol_list() {
        assert_eq!(parse_symbol_list("aapl, msft,,  nvda "), vec!["AAPL", "MSFT", "NVDA"]);
        assert!(parse_symbol_list(" , ").is_empty());
    }
}
