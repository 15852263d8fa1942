use analysis_core::PriceBar;

/// Exponential Moving Average.
///
/// Seeded with the SMA of the first `period` values, then smoothed with
/// `alpha = 2 / (period + 1)`. Element `k` of the output corresponds to
/// input index `period - 1 + k`. Empty when `data.len() < period`.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut result = Vec::with_capacity(data.len() - period + 1);

    let seed: f64 = data[..period].iter().sum::<f64>() / period as f64;
    result.push(seed);

    let mut prev = seed;
    for &value in &data[period..] {
        prev = (value - prev) * alpha + prev;
        result.push(prev);
    }

    result
}

/// Relative Strength Index with Wilder smoothing.
///
/// The first value uses the plain average gain/loss of the first `period`
/// changes. A window with no losses is 100, one with no gains is 0, and a
/// completely flat window is 50. Empty when `data.len() < period + 1`.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }

    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);

    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut rsi_values = Vec::with_capacity(gains.len() - period + 1);
    rsi_values.push(rsi_from_averages(avg_gain, avg_loss));

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        rsi_values.push(rsi_from_averages(avg_gain, avg_loss));
    }

    rsi_values
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        return 50.0;
    }
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - (100.0 / (1.0 + rs))).clamp(0.0, 100.0)
}

/// MACD (Moving Average Convergence Divergence)
pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

impl MacdResult {
    fn empty() -> Self {
        MacdResult { macd_line: vec![], signal_line: vec![], histogram: vec![] }
    }
}

/// MACD line, signal line and histogram, each aligned to the end of `data`.
/// Empty when `data.len() < slow_period + signal_period`.
pub fn macd(data: &[f64], fast_period: usize, slow_period: usize, signal_period: usize) -> MacdResult {
    if fast_period == 0 || signal_period == 0 || slow_period <= fast_period {
        return MacdResult::empty();
    }
    if data.len() < slow_period + signal_period {
        return MacdResult::empty();
    }

    let ema_fast = ema(data, fast_period);
    let ema_slow = ema(data, slow_period);

    // ema_fast starts at input index fast-1, ema_slow at slow-1.
    let offset = slow_period - fast_period;
    let macd_line: Vec<f64> = ema_slow
        .iter()
        .enumerate()
        .map(|(i, slow)| ema_fast[i + offset] - slow)
        .collect();

    let signal_line = ema(&macd_line, signal_period);

    let hist_offset = macd_line.len() - signal_line.len();
    let histogram: Vec<f64> = signal_line
        .iter()
        .enumerate()
        .map(|(i, signal)| macd_line[i + hist_offset] - signal)
        .collect();

    MacdResult {
        macd_line,
        signal_line,
        histogram,
    }
}

/// True range of each bar after the first
pub fn true_ranges(bars: &[PriceBar]) -> Vec<f64> {
    bars.windows(2)
        .map(|w| {
            let (prev, bar) = (&w[0], &w[1]);
            let high_low = bar.high - bar.low;
            let high_close = (bar.high - prev.close).abs();
            let low_close = (bar.low - prev.close).abs();
            high_low.max(high_close).max(low_close)
        })
        .collect()
}

/// Average True Range (Wilder). Empty when `bars.len() < period + 1`.
pub fn atr(bars: &[PriceBar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period + 1 {
        return vec![];
    }

    let true_ranges = true_ranges(bars);

    let mut atr_values = Vec::with_capacity(true_ranges.len() - period + 1);
    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    atr_values.push(atr);

    for tr in &true_ranges[period..] {
        atr = (atr * (period - 1) as f64 + tr) / period as f64;
        atr_values.push(atr);
    }

    atr_values
}
