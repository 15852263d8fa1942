use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MarketDataError;

/// One daily OHLCV observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    fn is_valid(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Bars ordered oldest to newest with strictly increasing timestamps. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries(Vec<PriceBar>);

impl PriceSeries {
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, MarketDataError> {
        if bars.is_empty() {
            return Err(MarketDataError::DataQuality("empty price history".to_string()));
        }
        if let Some(bad) = bars.iter().position(|b| !b.is_valid()) {
            return Err(MarketDataError::DataQuality(format!(
                "bar {} has a missing or negative field",
                bad
            )));
        }
        if bars.windows(2).any(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(MarketDataError::DataQuality(
                "bar timestamps are not strictly increasing".to_string(),
            ));
        }
        Ok(Self(bars))
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.0
    }

    pub fn closes(&self) -> Vec<f64> {
        self.0.iter().map(|b| b.close).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> &PriceBar {
        // Non-empty by construction.
        &self.0[self.0.len() - 1]
    }
}

/// Live quote for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub current_price: f64,
    pub previous_close: f64,
    pub volume: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
}

/// Latest value of each indicator; `None` means the series was too short.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSet {
    pub ema_short: Option<f64>,
    pub ema_long: Option<f64>,
    pub rsi: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub atr: Option<f64>,
}

/// Qualitative tier derived from RSI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum RankTier {
    Excellent,
    #[serde(rename = "Very Good")]
    VeryGood,
    Good,
    Fair,
    #[serde(rename = "N/A")]
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum SuggestedAction {
    Consider,
    Watch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum RiskFactor {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RiskNote {
    pub factor: RiskFactor,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProfitTarget {
    pub low: f64,
    pub high: f64,
}

/// One ranked gainer, built once per refresh and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolSnapshot {
    pub ticker: String,
    pub current_price: f64,
    pub previous_close: f64,
    pub change_absolute: f64,
    /// `None` when the previous close is not positive.
    pub change_percent: Option<f64>,
    pub volume: f64,
    pub indicators: IndicatorSet,
    pub rank_tier: RankTier,
    pub suggested_action: SuggestedAction,
    pub risk_note: RiskNote,
    pub stop_price: Option<f64>,
    pub profit_target: Option<ProfitTarget>,
}

/// Absolute and percent change from the previous close.
pub fn price_change(current_price: f64, previous_close: f64) -> (f64, Option<f64>) {
    let change = current_price - previous_close;
    let percent = if previous_close > 0.0 {
        Some(change / previous_close * 100.0)
    } else {
        None
    };
    (change, percent)
}

/// Trims and upper-cases a ticker. Returns `None` for blank input.
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let ticker = raw.trim().to_uppercase();
    if ticker.is_empty() {
        None
    } else {
        Some(ticker)
    }
}
