// =============================================================================
// Fast Stochastic Oscillator (%K / %D)
// =============================================================================
//
//   %K = 100 * (close - lowest_low(k_period)) / (highest_high - lowest_low)
//   %D = SMA(d_period) of %K
//
// The voting engine triggers on extreme-zone crossovers of %K over %D, so
// the previous bar's pair is carried alongside the latest one.

use crate::market_data::Candle;

/// Stochastic values at the latest close, plus the previous bar's pair for
/// crossover detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticValue {
    pub k: f64,
    pub d: f64,
    pub prev_k: Option<f64>,
    pub prev_d: Option<f64>,
}

impl StochasticValue {
    /// %K crossed above %D this bar while in the oversold zone.
    pub fn bullish_crossover(&self, oversold: f64) -> bool {
        match (self.prev_k, self.prev_d) {
            (Some(pk), Some(pd)) => self.k < oversold && self.k > self.d && pk <= pd,
            _ => false,
        }
    }

    /// %K crossed below %D this bar while in the overbought zone.
    pub fn bearish_crossover(&self, overbought: f64) -> bool {
        match (self.prev_k, self.prev_d) {
            (Some(pk), Some(pd)) => self.k > overbought && self.k < self.d && pk >= pd,
            _ => false,
        }
    }
}

/// Compute the fast stochastic at the latest close.
///
/// Returns `None` when fewer than `k_period + d_period - 1` candles are
/// available (the minimum for one %D value). A bar whose high equals its
/// window low (zero range) maps %K to a neutral 50.
pub fn fast_stochastic(
    candles: &[Candle],
    k_period: usize,
    d_period: usize,
) -> Option<StochasticValue> {
    if k_period == 0 || d_period == 0 {
        return None;
    }
    if candles.len() < k_period + d_period - 1 {
        return None;
    }

    // %K for every bar that has a full look-back window.
    let mut k_series = Vec::with_capacity(candles.len() - k_period + 1);
    for t in (k_period - 1)..candles.len() {
        let window = &candles[t + 1 - k_period..=t];
        let low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let range = high - low;
        let k = if range > 0.0 {
            100.0 * (candles[t].close - low) / range
        } else {
            50.0
        };
        if !k.is_finite() {
            return None;
        }
        k_series.push(k);
    }

    // %D: simple moving average of %K.
    let d_len = k_series.len().checked_sub(d_period - 1)?;
    let mut d_series = Vec::with_capacity(d_len);
    for i in 0..d_len {
        let avg = k_series[i..i + d_period].iter().sum::<f64>() / d_period as f64;
        d_series.push(avg);
    }

    let k = *k_series.last()?;
    let d = *d_series.last()?;
    let prev_k = (k_series.len() >= 2).then(|| k_series[k_series.len() - 2]);
    let prev_d = (d_series.len() >= 2).then(|| d_series[d_series.len() - 2]);

    Some(StochasticValue { k, d, prev_k, prev_d })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: 0,
            open: close,
            high,
            low,
            close,
            volume: 100.0,
            complete: true,
        }
    }

    #[test]
    fn stochastic_insufficient_data() {
        let candles = vec![candle(101.0, 99.0, 100.0); 6];
        // Need k + d - 1 = 7 candles for (5, 3).
        assert!(fast_stochastic(&candles, 5, 3).is_none());
    }

    #[test]
    fn stochastic_close_at_high_is_100() {
        let candles: Vec<Candle> = (0..10)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(base + 1.0, base - 1.0, base + 1.0)
            })
            .collect();
        let stoch = fast_stochastic(&candles, 5, 3).unwrap();
        assert!((stoch.k - 100.0).abs() < 1e-10);
    }

    #[test]
    fn stochastic_close_at_low_is_0() {
        let candles: Vec<Candle> = (0..10)
            .map(|i| {
                let base = 100.0 - i as f64;
                candle(base + 1.0, base - 1.0, base - 1.0)
            })
            .collect();
        let stoch = fast_stochastic(&candles, 5, 3).unwrap();
        assert!(stoch.k.abs() < 1e-10);
    }

    #[test]
    fn stochastic_zero_range_is_neutral() {
        let candles = vec![candle(100.0, 100.0, 100.0); 10];
        let stoch = fast_stochastic(&candles, 5, 3).unwrap();
        assert!((stoch.k - 50.0).abs() < 1e-10);
        assert!((stoch.d - 50.0).abs() < 1e-10);
    }

    #[test]
    fn stochastic_carries_previous_pair() {
        let candles: Vec<Candle> = (0..12)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.9).sin() * 3.0;
                candle(base + 1.0, base - 1.0, base)
            })
            .collect();
        let stoch = fast_stochastic(&candles, 5, 3).unwrap();
        assert!(stoch.prev_k.is_some());
        assert!(stoch.prev_d.is_some());
    }

    #[test]
    fn crossover_detection() {
        let value = StochasticValue {
            k: 18.0,
            d: 15.0,
            prev_k: Some(12.0),
            prev_d: Some(14.0),
        };
        assert!(value.bullish_crossover(20.0));
        assert!(!value.bearish_crossover(80.0));

        let value = StochasticValue {
            k: 85.0,
            d: 88.0,
            prev_k: Some(92.0),
            prev_d: Some(90.0),
        };
        assert!(value.bearish_crossover(80.0));
        assert!(!value.bullish_crossover(20.0));
    }

    #[test]
    fn no_crossover_without_history() {
        let value = StochasticValue {
            k: 18.0,
            d: 15.0,
            prev_k: None,
            prev_d: None,
        };
        assert!(!value.bullish_crossover(20.0));
    }
}
