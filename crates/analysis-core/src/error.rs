use thiserror::Error;

/// Errors raised at the market-data boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    /// Network failure, timeout, rate limit or 5xx from the provider.
    #[error("Upstream unavailable: {0}")]
    TransientUpstream(String),

    /// Missing, NaN or otherwise unusable fields, or an empty/out-of-order series.
    #[error("Data quality: {0}")]
    DataQuality(String),

    /// Missing or rejected credentials.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MarketDataError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, MarketDataError::Configuration(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, MarketDataError::TransientUpstream(_))
    }

    pub fn is_data_quality(&self) -> bool {
        matches!(self, MarketDataError::DataQuality(_))
    }
}
