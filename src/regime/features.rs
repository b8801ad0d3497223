// =============================================================================
// Regime features — rolling statistics over a candle window
// =============================================================================
//
// Each feature row describes the market at one candle:
//
//   [ return, return volatility, skewness, kurtosis,
//     signed trend strength, ATR%, volume ratio ]
//
// Trend strength is ADX normalised to [0, 1] and signed by the direction of
// the trailing price change, so a single dimension carries both how hard
// the market is trending and which way. Rows with any undefined component
// are dropped, mirroring the indicator layer's insufficient-history
// semantics.

use crate::indicators::adx::wilder_adx;
use crate::indicators::atr::atr_pct;
use crate::indicators::volume::volume_ratio;
use crate::market_data::Candle;

/// Number of dimensions in a feature row.
pub const FEATURE_DIM: usize = 7;

/// Column indices into a feature row.
pub const F_RETURN: usize = 0;
pub const F_VOLATILITY: usize = 1;
pub const F_SKEWNESS: usize = 2;
pub const F_KURTOSIS: usize = 3;
pub const F_TREND: usize = 4;
pub const F_ATR_PCT: usize = 5;
pub const F_VOLUME: usize = 6;

pub type FeatureRow = [f64; FEATURE_DIM];

/// Rolling window for the return-distribution statistics.
const STATS_WINDOW: usize = 20;
const ADX_PERIOD: usize = 14;
const ATR_PERIOD: usize = 14;
const VOLUME_PERIOD: usize = 20;

/// ADX value treated as full trend strength when normalising.
const ADX_SCALE: f64 = 50.0;

/// Earliest candle index that can produce a complete row.
fn first_valid_index() -> usize {
    STATS_WINDOW.max(2 * ADX_PERIOD).max(ATR_PERIOD).max(VOLUME_PERIOD - 1)
}

/// Compute every complete feature row for the window, oldest first.
pub fn feature_rows(candles: &[Candle]) -> Vec<FeatureRow> {
    if candles.len() <= first_valid_index() {
        return Vec::new();
    }

    (first_valid_index()..candles.len())
        .filter_map(|t| feature_row_at(candles, t))
        .collect()
}

/// The feature row at the latest candle, when the window allows one.
pub fn latest_feature_row(candles: &[Candle]) -> Option<FeatureRow> {
    if candles.is_empty() {
        return None;
    }
    feature_row_at(candles, candles.len() - 1)
}

fn feature_row_at(candles: &[Candle], t: usize) -> Option<FeatureRow> {
    if t < first_valid_index() || t >= candles.len() {
        return None;
    }

    let close_t = candles[t].close;
    let close_prev = candles[t - 1].close;
    if close_prev == 0.0 {
        return None;
    }
    let ret = close_t / close_prev - 1.0;

    // Return-distribution statistics over the trailing window.
    let mut rets = Vec::with_capacity(STATS_WINDOW);
    for i in (t + 1 - STATS_WINDOW)..=t {
        let prev = candles[i - 1].close;
        if prev == 0.0 {
            return None;
        }
        rets.push(candles[i].close / prev - 1.0);
    }
    let (volatility, skewness, kurtosis) = distribution_shape(&rets);

    // Signed trend strength from ADX and the trailing price change.
    let adx_slice = &candles[t + 1 - (2 * ADX_PERIOD + 1)..=t];
    let adx = wilder_adx(adx_slice, ADX_PERIOD)?;
    let trail_change = close_t - candles[t - STATS_WINDOW].close;
    let trend_sign = if trail_change < 0.0 { -1.0 } else { 1.0 };
    let trend = (adx / ADX_SCALE).min(1.0) * trend_sign;

    let atr_slice = &candles[t + 1 - (ATR_PERIOD + 1)..=t];
    let atr_pct_value = atr_pct(atr_slice, ATR_PERIOD)?;

    let vol_slice = &candles[t + 1 - VOLUME_PERIOD..=t];
    let volume = volume_ratio(vol_slice, VOLUME_PERIOD)?;

    let row = [ret, volatility, skewness, kurtosis, trend, atr_pct_value, volume];
    row.iter().all(|v| v.is_finite()).then_some(row)
}

/// Population standard deviation, skewness and excess kurtosis of a sample.
/// A degenerate sample (zero variance) reports zero shape.
fn distribution_shape(values: &[f64]) -> (f64, f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if std_dev < f64::EPSILON {
        return (0.0, 0.0, 0.0);
    }

    let skewness = values.iter().map(|v| ((v - mean) / std_dev).powi(3)).sum::<f64>() / n;
    let kurtosis = values.iter().map(|v| ((v - mean) / std_dev).powi(4)).sum::<f64>() / n - 3.0;

    (std_dev, skewness, kurtosis)
}

// =============================================================================
// Standardizer — per-dimension z-scores against the fit window
// =============================================================================

/// Per-dimension mean/std captured at fit time, applied at prediction time
/// so that live vectors are scored in the same space the model was fitted
/// in.
#[derive(Debug, Clone)]
pub struct Standardizer {
    pub mean: FeatureRow,
    pub std: FeatureRow,
}

impl Standardizer {
    /// Fit over the given rows. Returns `None` on an empty input. A
    /// zero-variance dimension keeps scale 1.0 (values pass through
    /// centred).
    pub fn fit(rows: &[FeatureRow]) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }

        let n = rows.len() as f64;
        let mut mean = [0.0; FEATURE_DIM];
        let mut std = [0.0; FEATURE_DIM];

        for row in rows {
            for (d, v) in row.iter().enumerate() {
                mean[d] += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        for row in rows {
            for (d, v) in row.iter().enumerate() {
                std[d] += (v - mean[d]).powi(2);
            }
        }
        for s in &mut std {
            *s = (*s / n).sqrt();
            if *s < f64::EPSILON {
                *s = 1.0;
            }
        }

        Some(Self { mean, std })
    }

    pub fn transform(&self, row: &FeatureRow) -> FeatureRow {
        let mut out = [0.0; FEATURE_DIM];
        for d in 0..FEATURE_DIM {
            out[d] = (row[d] - self.mean[d]) / self.std[d];
        }
        out
    }
}
