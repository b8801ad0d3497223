// =============================================================================
// Bollinger Bands
// =============================================================================
//
// middle = SMA(period), upper/lower = middle ± num_std * σ.
//
// The band multiplier `num_std` is regime-dependent at the call site:
// ranging regimes use tighter bands (mean-reversion triggers earlier),
// trending regimes use wider bands (breakouts must be decisive). The
// position-in-band of the latest close is the voting engine's input:
// 0.0 = at the lower band, 1.0 = at the upper band.

/// Bollinger band values at the latest close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// Position of the latest close within the band, unclamped — values
    /// outside [0, 1] mean the close sits beyond a band.
    pub position: f64,
}

/// Compute Bollinger Bands over the trailing `period` closes.
///
/// Returns `None` when:
/// - `period` is zero or the window is shorter than `period`;
/// - any produced value is non-finite.
///
/// A perfectly flat window (σ = 0) yields position 0.5, not a division by
/// zero.
pub fn bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerBands> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;

    let last_close = *closes.last()?;
    let band_width = upper - lower;
    let position = if band_width > 0.0 {
        (last_close - lower) / band_width
    } else {
        0.5
    };

    let bands = BollingerBands {
        upper,
        middle,
        lower,
        position,
    };

    (bands.upper.is_finite() && bands.position.is_finite()).then_some(bands)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_insufficient_data() {
        let closes = vec![1.0, 2.0, 3.0];
        assert!(bollinger(&closes, 14, 2.0).is_none());
        assert!(bollinger(&closes, 0, 2.0).is_none());
    }

    #[test]
    fn bollinger_band_ordering() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let bands = bollinger(&closes, 14, 2.0).unwrap();
        assert!(bands.upper > bands.middle);
        assert!(bands.lower < bands.middle);
    }

    #[test]
    fn bollinger_flat_window_is_neutral() {
        let closes = vec![100.0; 20];
        let bands = bollinger(&closes, 14, 2.0).unwrap();
        assert!((bands.position - 0.5).abs() < 1e-10);
        assert!((bands.upper - bands.lower).abs() < 1e-10);
    }

    #[test]
    fn bollinger_position_above_band_exceeds_one() {
        // Mostly flat window with a sharp final spike: the close breaks the
        // upper band and the position exceeds 1.0.
        let mut closes = vec![100.0; 19];
        closes.push(110.0);
        let bands = bollinger(&closes, 14, 2.0).unwrap();
        assert!(bands.position > 1.0, "position {} should exceed 1", bands.position);
    }

    #[test]
    fn wider_multiplier_widens_bands() {
        let closes: Vec<f64> = (1..=30).map(|x| (x as f64 * 0.7).sin() * 5.0 + 100.0).collect();
        let tight = bollinger(&closes, 14, 1.8).unwrap();
        let wide = bollinger(&closes, 14, 2.2).unwrap();
        assert!(wide.upper > tight.upper);
        assert!(wide.lower < tight.lower);
    }
}
