// =============================================================================
// MACD — Moving Average Convergence / Divergence
// =============================================================================
//
// Fast MACD (6/13/4) for quick momentum detection:
//
//   macd      = EMA_fast(close) - EMA_slow(close)
//   signal    = EMA_signal(macd)
//   histogram = macd - signal
//
// The voting engine needs both the latest histogram and the previous one to
// decide whether momentum is expanding, so the previous histogram is carried
// alongside (None when the window only just covers the signal span).

use crate::indicators::ema::ema_series;

/// MACD values at the latest close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
    /// Histogram one bar earlier, when available.
    pub prev_histogram: Option<f64>,
}

impl MacdValue {
    /// Histogram is positive and not shrinking versus the previous bar.
    pub fn is_expanding_up(&self) -> bool {
        match self.prev_histogram {
            Some(prev) => self.histogram > 0.0 && self.histogram >= prev,
            None => false,
        }
    }

    /// Histogram is negative and not shrinking versus the previous bar.
    pub fn is_expanding_down(&self) -> bool {
        match self.prev_histogram {
            Some(prev) => self.histogram < 0.0 && self.histogram <= prev,
            None => false,
        }
    }
}

/// Compute MACD at the latest close.
///
/// Returns `None` when:
/// - any period is zero, or `fast >= slow`;
/// - the window is shorter than `slow + signal_period - 1` closes (the
///   minimum needed for one signal-line value).
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> Option<MacdValue> {
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return None;
    }
    if closes.len() < slow + signal_period - 1 {
        return None;
    }

    let fast_series = ema_series(closes, fast);
    let slow_series = ema_series(closes, slow);
    if fast_series.is_empty() || slow_series.is_empty() {
        return None;
    }

    // Align the two EMA series on close indices: element i of an EMA series
    // corresponds to close index period-1+i. The MACD line starts where the
    // slow EMA starts.
    let offset = slow - fast;
    let macd_line: Vec<f64> = slow_series
        .iter()
        .enumerate()
        .filter_map(|(i, &slow_val)| fast_series.get(i + offset).map(|&f| f - slow_val))
        .collect();

    let signal_series = ema_series(&macd_line, signal_period);
    let signal_latest = *signal_series.last()?;
    let macd_latest = *macd_line.last()?;
    let histogram = macd_latest - signal_latest;

    if !histogram.is_finite() {
        return None;
    }

    // Previous histogram needs one more signal value.
    let prev_histogram = if signal_series.len() >= 2 && macd_line.len() >= 2 {
        let prev = macd_line[macd_line.len() - 2] - signal_series[signal_series.len() - 2];
        prev.is_finite().then_some(prev)
    } else {
        None
    };

    Some(MacdValue {
        macd: macd_latest,
        signal: signal_latest,
        histogram,
        prev_histogram,
    })
}
