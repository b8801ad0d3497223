// =============================================================================
// Relative Strength Index (RSI) — Wilder's smoothing
// =============================================================================
//
// The engine uses a short RSI (7) tuned for intraday timeframes.
//
//   seed:  avg_gain / avg_loss = SMA of the first `period` gains / losses
//   then:  avg_gain = (avg_gain * (period - 1) + gain) / period
//          avg_loss = (avg_loss * (period - 1) + loss) / period
//   RSI  = 100 - 100 / (1 + avg_gain / avg_loss)
//
// The degenerate zero-movement case (no gains AND no losses) maps to a
// neutral 50, never to a division by zero.

/// Most recent Wilder-smoothed RSI over `period`, in [0, 100].
///
/// # Edge cases
/// - `period == 0` or fewer than `period + 1` closes => `None`
/// - Flat window (no movement) => 50.0
/// - Only gains => 100.0, only losses => 0.0
/// - Non-finite input => `None`
pub fn wilder_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    // A NaN delta would compare false against both 0-guards below and read
    // as zero movement; reject bad input outright instead.
    if closes.iter().any(|c| !c.is_finite()) {
        return None;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let period_f = period as f64;

    let mut avg_gain = deltas[..period]
        .iter()
        .map(|&d| if d > 0.0 { d } else { 0.0 })
        .sum::<f64>()
        / period_f;
    let mut avg_loss = deltas[..period]
        .iter()
        .map(|&d| if d < 0.0 { -d } else { 0.0 })
        .sum::<f64>()
        / period_f;

    for &delta in &deltas[period..] {
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { -delta } else { 0.0 };
        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;
    }

    rsi_from_averages(avg_gain, avg_loss)
}

/// Convert smoothed averages into an RSI value, handling the degenerate
/// cases explicitly.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_gain == 0.0 && avg_loss == 0.0 {
        50.0 // Zero price movement — neutral, not NaN.
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };

    rsi.is_finite().then_some(rsi)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_requires_period_plus_one_closes() {
        let closes: Vec<f64> = (1..=7).map(|x| x as f64).collect();
        assert!(wilder_rsi(&closes, 7).is_none());
        let closes: Vec<f64> = (1..=8).map(|x| x as f64).collect();
        assert!(wilder_rsi(&closes, 7).is_some());
    }

    #[test]
    fn rsi_period_zero_is_none() {
        assert!(wilder_rsi(&[1.0, 2.0, 3.0], 0).is_none());
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let rsi = wilder_rsi(&closes, 7).unwrap();
        assert!((rsi - 100.0).abs() < 1e-10);
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let rsi = wilder_rsi(&closes, 7).unwrap();
        assert!(rsi.abs() < 1e-10);
    }

    #[test]
    fn rsi_flat_market_is_neutral_50() {
        let closes = vec![1.2650; 30];
        let rsi = wilder_rsi(&closes, 7).unwrap();
        assert!((rsi - 50.0).abs() < 1e-10);
    }

    #[test]
    fn rsi_stays_in_range() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        let rsi = wilder_rsi(&closes, 7).unwrap();
        assert!((0.0..=100.0).contains(&rsi), "RSI {rsi} out of range");
    }

    #[test]
    fn rsi_nan_input_is_none() {
        let mut closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        closes[15] = f64::NAN;
        assert!(wilder_rsi(&closes, 7).is_none());
    }
}
