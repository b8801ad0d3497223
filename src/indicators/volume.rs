// =============================================================================
// Volume ratio — latest volume against its trailing average
// =============================================================================

use crate::market_data::Candle;

/// Latest volume divided by the SMA of the trailing `period` volumes
/// (the latest bar included). Above 1.0 means above-average participation.
///
/// Returns `None` on a short window or a zero/degenerate average.
pub fn volume_ratio(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let window = &candles[candles.len() - period..];
    let avg = window.iter().map(|c| c.volume).sum::<f64>() / period as f64;
    if avg <= 0.0 {
        return None;
    }

    let ratio = candles.last()?.volume / avg;
    ratio.is_finite().then_some(ratio)
}
