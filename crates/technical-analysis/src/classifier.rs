//! Rank, action, risk note and ATR-based exit levels for one symbol.

use analysis_core::{IndicatorSet, ProfitTarget, RankTier, RiskFactor, RiskNote, SuggestedAction};

/// RSI above which momentum is considered stretched
pub const OVERBOUGHT_RSI: f64 = 75.0;
/// ATR as a fraction of price above which a symbol is flagged volatile
pub const HIGH_VOLATILITY_ATR_RATIO: f64 = 0.05;

pub const STOP_ATR_MULTIPLE: f64 = 2.0;
pub const TARGET_LOW_ATR_MULTIPLE: f64 = 2.0;
pub const TARGET_HIGH_ATR_MULTIPLE: f64 = 3.0;

/// Maps RSI to a tier, highest threshold first.
pub fn rank_tier(rsi: Option<f64>) -> RankTier {
    match rsi {
        None => RankTier::Unavailable,
        Some(v) if v.is_nan() => RankTier::Unavailable,
        Some(v) if v > 75.0 => RankTier::Excellent,
        Some(v) if v > 65.0 => RankTier::VeryGood,
        Some(v) if v > 55.0 => RankTier::Good,
        Some(_) => RankTier::Fair,
    }
}

/// Good and Fair names are only worth considering when trend and momentum agree.
fn trend_confirmed(indicators: &IndicatorSet) -> bool {
    match (indicators.macd_histogram, indicators.ema_short, indicators.ema_long) {
        (Some(hist), Some(short), Some(long)) => hist > 0.0 && short > long,
        _ => false,
    }
}

pub fn suggested_action(tier: RankTier, indicators: &IndicatorSet) -> SuggestedAction {
    match tier {
        RankTier::Excellent | RankTier::VeryGood => SuggestedAction::Consider,
        RankTier::Good | RankTier::Fair if trend_confirmed(indicators) => SuggestedAction::Consider,
        RankTier::Good | RankTier::Fair | RankTier::Unavailable => SuggestedAction::Watch,
    }
}

struct RiskRule {
    factor: RiskFactor,
    reason: &'static str,
    applies: fn(f64, &IndicatorSet) -> bool,
}

/// Ordered catalog; the first matching rule wins and the last always matches.
const RISK_CATALOG: &[RiskRule] = &[
    RiskRule {
        factor: RiskFactor::High,
        reason: "Overbought momentum, pullback risk is elevated",
        applies: |_, ind| ind.rsi.is_some_and(|r| r > OVERBOUGHT_RSI),
    },
    RiskRule {
        factor: RiskFactor::High,
        reason: "Wide daily ranges, volatility stop sits far below price",
        applies: |price, ind| {
            price > 0.0 && ind.atr.is_some_and(|a| a / price > HIGH_VOLATILITY_ATR_RATIO)
        },
    },
    RiskRule {
        factor: RiskFactor::Medium,
        reason: "Trading below its longer-term trend",
        applies: |_, ind| matches!((ind.ema_short, ind.ema_long), (Some(s), Some(l)) if s < l),
    },
    RiskRule {
        factor: RiskFactor::Medium,
        reason: "MACD momentum is fading",
        applies: |_, ind| ind.macd_histogram.is_some_and(|h| h < 0.0),
    },
    RiskRule {
        factor: RiskFactor::Medium,
        reason: "Limited history, some indicators unavailable",
        applies: |_, ind| {
            ind.ema_short.is_none()
                || ind.ema_long.is_none()
                || ind.rsi.is_none()
                || ind.macd_histogram.is_none()
                || ind.atr.is_none()
        },
    },
    RiskRule {
        factor: RiskFactor::Low,
        reason: "Trend and momentum are aligned",
        applies: |_, _| true,
    },
];

pub fn risk_note(current_price: f64, indicators: &IndicatorSet) -> RiskNote {
    let rule = RISK_CATALOG
        .iter()
        .find(|rule| (rule.applies)(current_price, indicators))
        .unwrap_or(&RISK_CATALOG[RISK_CATALOG.len() - 1]);

    RiskNote {
        factor: rule.factor,
        reason: rule.reason.to_string(),
    }
}

/// ATR-derived stop and profit band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitLevels {
    pub stop_price: f64,
    pub profit_target: ProfitTarget,
}

pub fn exit_levels(current_price: f64, atr: Option<f64>) -> Option<ExitLevels> {
    let atr = atr.filter(|a| a.is_finite())?;
    Some(ExitLevels {
        stop_price: current_price - STOP_ATR_MULTIPLE * atr,
        profit_target: ProfitTarget {
            low: current_price + TARGET_LOW_ATR_MULTIPLE * atr,
            high: current_price + TARGET_HIGH_ATR_MULTIPLE * atr,
        },
    })
}

/// Everything the classifier derives for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub rank_tier: RankTier,
    pub suggested_action: SuggestedAction,
    pub risk_note: RiskNote,
    pub exit_levels: Option<ExitLevels>,
}

pub fn classify(current_price: f64, indicators: &IndicatorSet) -> Classification {
    let rank_tier = rank_tier(indicators.rsi);
    Classification {
        rank_tier,
        suggested_action: suggested_action(rank_tier, indicators),
        risk_note: risk_note(current_price, indicators),
        exit_levels: exit_levels(current_price, indicators.atr),
    }
}
