use analysis_core::{IndicatorSet, PriceSeries};

use crate::indicators::{atr, ema, macd, rsi};

/// Window lengths used by the indicator engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorParams {
    pub ema_short: usize,
    pub ema_long: usize,
    pub rsi: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub atr: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ema_short: 10,
            ema_long: 50,
            rsi: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            atr: 14,
        }
    }
}

/// Computes the latest value of each indicator for one symbol's history.
///
/// Each indicator is independent: a series too short for one of them leaves
/// only that field `None`.
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    params: IndicatorParams,
}

impl IndicatorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute(&self, series: &PriceSeries) -> IndicatorSet {
        let closes = series.closes();
        let p = &self.params;

        let indicators = IndicatorSet {
            ema_short: ema(&closes, p.ema_short).last().copied(),
            ema_long: ema(&closes, p.ema_long).last().copied(),
            rsi: rsi(&closes, p.rsi).last().copied(),
            macd_histogram: macd(&closes, p.macd_fast, p.macd_slow, p.macd_signal)
                .histogram
                .last()
                .copied(),
            atr: atr(series.bars(), p.atr).last().copied(),
        };

        tracing::debug!(
            bars = series.len(),
            rsi = ?indicators.rsi,
            atr = ?indicators.atr,
            "computed indicators"
        );

        indicators
    }
}
