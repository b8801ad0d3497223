// =============================================================================
// Average True Range (ATR) — Wilder's smoothing
// =============================================================================
//
// True Range per bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR:
//   ATR_0 = SMA of the first `period` TR values
//   ATR_t = (ATR_{t-1} * (period - 1) + TR_t) / period
//
// ATR% (ATR as a percentage of the close) is the engine's cross-instrument
// volatility measure: the quality filter gates on it and the risk sizer
// compares the current value against its trailing distribution.

use crate::market_data::Candle;

/// Full ATR series, one value per candle starting at index `period`.
///
/// Empty result when `period` is zero, the window is shorter than
/// `period + 1` candles, or a non-finite value is produced (the series is
/// truncated at the first bad value).
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Vec::new();
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|pair| {
            let prev_close = pair[0].close;
            let high = pair[1].high;
            let low = pair[1].low;
            (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs())
        })
        .collect();

    let period_f = period as f64;
    let seed = true_ranges[..period].iter().sum::<f64>() / period_f;
    if !seed.is_finite() {
        return Vec::new();
    }

    let mut series = Vec::with_capacity(true_ranges.len() - period + 1);
    series.push(seed);

    let mut atr = seed;
    for &tr in &true_ranges[period..] {
        atr = (atr * (period_f - 1.0) + tr) / period_f;
        if !atr.is_finite() {
            break;
        }
        series.push(atr);
    }

    series
}

/// Most recent ATR value.
pub fn wilder_atr(candles: &[Candle], period: usize) -> Option<f64> {
    atr_series(candles, period).last().copied()
}

/// Most recent ATR as a percentage of the latest close.
pub fn atr_pct(candles: &[Candle], period: usize) -> Option<f64> {
    let atr = wilder_atr(candles, period)?;
    let last_close = candles.last()?.close;
    if last_close == 0.0 {
        return None;
    }
    Some((atr / last_close) * 100.0)
}

/// ATR% series aligned with `atr_series` (one value per candle starting at
/// index `period`). Candles with a zero close are skipped.
pub fn atr_pct_series(candles: &[Candle], period: usize) -> Vec<f64> {
    atr_series(candles, period)
        .iter()
        .zip(&candles[period.min(candles.len())..])
        .filter(|(_, c)| c.close != 0.0)
        .map(|(atr, c)| (atr / c.close) * 100.0)
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: 0,
            open,
            high,
            low,
            close,
            volume: 100.0,
            complete: true,
        }
    }

    #[test]
    fn atr_period_zero_and_short_window() {
        let candles = vec![candle(100.0, 105.0, 95.0, 102.0); 20];
        assert!(wilder_atr(&candles, 0).is_none());
        assert!(wilder_atr(&candles[..10], 14).is_none());
    }

    #[test]
    fn atr_constant_range_converges() {
        // Every bar spans exactly 10 with the close at the midpoint; TR is
        // constant so ATR must converge to 10.
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.1;
                candle(base, base + 5.0, base - 5.0, base)
            })
            .collect();
        let atr = wilder_atr(&candles, 14).unwrap();
        assert!((atr - 10.0).abs() < 1.0, "expected ATR near 10, got {atr}");
    }

    #[test]
    fn atr_reflects_gaps() {
        let candles = vec![
            candle(100.0, 105.0, 95.0, 95.0),
            candle(110.0, 115.0, 108.0, 112.0), // gap up: |115 - 95| = 20 > 7
            candle(112.0, 118.0, 110.0, 115.0),
            candle(115.0, 120.0, 113.0, 118.0),
        ];
        let atr = wilder_atr(&candles, 3).unwrap();
        assert!(atr > 7.0, "ATR should reflect the gap, got {atr}");
    }

    #[test]
    fn atr_series_length() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(base, base + 2.0, base - 2.0, base)
            })
            .collect();
        // One value per candle from index 14 to 29.
        assert_eq!(atr_series(&candles, 14).len(), 16);
    }

    #[test]
    fn atr_pct_scales_with_price() {
        let cheap: Vec<Candle> = (0..30)
            .map(|_| candle(1.0, 1.01, 0.99, 1.0))
            .collect();
        let dear: Vec<Candle> = (0..30)
            .map(|_| candle(100.0, 101.0, 99.0, 100.0))
            .collect();
        let pct_cheap = atr_pct(&cheap, 14).unwrap();
        let pct_dear = atr_pct(&dear, 14).unwrap();
        // Same relative range, wildly different absolute prices.
        assert!((pct_cheap - 2.0).abs() < 0.1);
        assert!((pct_dear - 2.0).abs() < 0.1);
    }

    #[test]
    fn atr_nan_truncates() {
        let mut candles: Vec<Candle> = (0..30)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(base, base + 2.0, base - 2.0, base)
            })
            .collect();
        candles[20].high = f64::NAN;
        let series = atr_series(&candles, 14);
        assert!(series.len() < 16);
    }
}
