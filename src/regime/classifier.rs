// =============================================================================
// Regime Classifier — Gaussian mixture behind a fit / predict interface
// =============================================================================
//
// A regime is always assigned, never null: cold start, insufficient history
// and unfitted models all map to `Unknown` (not tradeable).
//
// Mapping from a predicted cluster to a named label is deterministic and
// combines three ingredients:
//   (a) the cluster — its fitted mean trend-strength magnitude decides
//       trending vs ranging vs transitional;
//   (b) the sign of the live trend-strength feature — decides up vs down,
//       so two regimes sharing a volatility level are distinguished by
//       direction;
//   (c) the volatility percentile — the live ATR% against the fit window's
//       distribution decides the high/low volatility split.
//
// Refitting is a separate batch operation from prediction. A refit swaps in
// a new immutable model snapshot atomically; concurrent predictions either
// see the old snapshot or the new one, never a partially updated model.

use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::market_data::Candle;
use crate::regime::features::{
    feature_rows, latest_feature_row, FeatureRow, Standardizer, F_ATR_PCT, F_TREND,
};
use crate::regime::gmm::{FittedGmm, GaussianMixture, GmmParams};

// =============================================================================
// Labels
// =============================================================================

/// Discrete market-regime label. Always assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeLabel {
    TrendingUpLowVol,
    TrendingUpHighVol,
    TrendingDownLowVol,
    TrendingDownHighVol,
    RangingLowVol,
    RangingHighVol,
    Transitional,
    Unknown,
}

impl RegimeLabel {
    /// Whether the engine considers this regime worth trading. Choppy
    /// high-volatility ranges, transitions and unknown states are excluded.
    pub fn tradeable(self) -> bool {
        !matches!(
            self,
            Self::RangingHighVol | Self::Transitional | Self::Unknown
        )
    }

    pub fn is_trending_up(self) -> bool {
        matches!(self, Self::TrendingUpLowVol | Self::TrendingUpHighVol)
    }

    pub fn is_trending_down(self) -> bool {
        matches!(self, Self::TrendingDownLowVol | Self::TrendingDownHighVol)
    }

    pub fn is_ranging(self) -> bool {
        matches!(self, Self::RangingLowVol | Self::RangingHighVol)
    }
}

impl std::fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::TrendingUpLowVol => "trending_up_low_vol",
            Self::TrendingUpHighVol => "trending_up_high_vol",
            Self::TrendingDownLowVol => "trending_down_low_vol",
            Self::TrendingDownHighVol => "trending_down_high_vol",
            Self::RangingLowVol => "ranging_low_vol",
            Self::RangingHighVol => "ranging_high_vol",
            Self::Transitional => "transitional",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Classification result: the label, its tradeable verdict and the model's
/// posterior confidence (0 for unfitted / insufficient data).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeClassification {
    pub label: RegimeLabel,
    pub tradeable: bool,
    pub confidence: f64,
}

impl RegimeClassification {
    pub fn unknown() -> Self {
        Self {
            label: RegimeLabel::Unknown,
            tradeable: false,
            confidence: 0.0,
        }
    }

    fn of(label: RegimeLabel, confidence: f64) -> Self {
        Self {
            label,
            tradeable: label.tradeable(),
            confidence,
        }
    }
}

// =============================================================================
// The fit / predict interface
// =============================================================================

/// Narrow interface so alternative classifiers (rule-based, other
/// clustering methods) can replace the Gaussian mixture without touching
/// the rest of the pipeline.
pub trait RegimeModel: Send + Sync {
    /// Batch-fit the model from a candle history.
    fn fit(&self, candles: &[Candle]) -> Result<()>;

    /// Classify the latest state of the window. Must be deterministic for a
    /// given fitted model and input.
    fn predict(&self, candles: &[Candle]) -> RegimeClassification;

    fn is_fitted(&self) -> bool;
}

// =============================================================================
// Configuration
// =============================================================================

fn default_n_components() -> usize {
    4
}
fn default_max_iter() -> usize {
    100
}
fn default_seed() -> u64 {
    42
}
fn default_min_confidence() -> f64 {
    0.6
}
fn default_min_fit_rows() -> usize {
    100
}
fn default_trend_strong() -> f64 {
    0.5 // ADX 25 on the normalised scale
}
fn default_trend_weak() -> f64 {
    0.4 // ADX 20 on the normalised scale
}
fn default_high_vol_percentile() -> f64 {
    0.75
}

/// Tunables for the mixture classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    #[serde(default = "default_n_components")]
    pub n_components: usize,

    #[serde(default = "default_max_iter")]
    pub max_iter: usize,

    /// Fixed RNG seed for the fit, making classification reproducible.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Posterior confidence below which the state reads as transitional.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Minimum feature rows required before a fit is attempted.
    #[serde(default = "default_min_fit_rows")]
    pub min_fit_rows: usize,

    /// Cluster mean |trend| at or above which the cluster is trending.
    #[serde(default = "default_trend_strong")]
    pub trend_strong: f64,

    /// Cluster mean |trend| below which the cluster is ranging.
    #[serde(default = "default_trend_weak")]
    pub trend_weak: f64,

    /// ATR% percentile at or above which volatility reads as high.
    #[serde(default = "default_high_vol_percentile")]
    pub high_vol_percentile: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            n_components: default_n_components(),
            max_iter: default_max_iter(),
            seed: default_seed(),
            min_confidence: default_min_confidence(),
            min_fit_rows: default_min_fit_rows(),
            trend_strong: default_trend_strong(),
            trend_weak: default_trend_weak(),
            high_vol_percentile: default_high_vol_percentile(),
        }
    }
}

// =============================================================================
// GmmRegimeClassifier
// =============================================================================

/// Everything a prediction needs, captured at fit time. Immutable; shared
/// via `Arc` so readers never observe a half-built model.
struct FittedRegime {
    scaler: Standardizer,
    mixture: FittedGmm,
    /// Mean |trend strength| of the rows assigned to each cluster.
    cluster_trend: Vec<f64>,
    /// Raw ATR% of the fit window, sorted, for percentile ranking.
    vol_sorted: Vec<f64>,
}

/// Gaussian-mixture regime classifier with atomic snapshot swap on refit.
pub struct GmmRegimeClassifier {
    config: RegimeConfig,
    model: RwLock<Option<Arc<FittedRegime>>>,
}

impl GmmRegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self {
            config,
            model: RwLock::new(None),
        }
    }

    fn map_to_label(&self, fitted: &FittedRegime, row: &FeatureRow, cluster: usize) -> RegimeLabel {
        let trendiness = fitted.cluster_trend.get(cluster).copied().unwrap_or(0.0);
        let high_vol = percentile_rank(&fitted.vol_sorted, row[F_ATR_PCT])
            >= self.config.high_vol_percentile;

        if trendiness >= self.config.trend_strong {
            let up = row[F_TREND] >= 0.0;
            match (up, high_vol) {
                (true, true) => RegimeLabel::TrendingUpHighVol,
                (true, false) => RegimeLabel::TrendingUpLowVol,
                (false, true) => RegimeLabel::TrendingDownHighVol,
                (false, false) => RegimeLabel::TrendingDownLowVol,
            }
        } else if trendiness < self.config.trend_weak {
            if high_vol {
                RegimeLabel::RangingHighVol
            } else {
                RegimeLabel::RangingLowVol
            }
        } else {
            RegimeLabel::Transitional
        }
    }
}

impl RegimeModel for GmmRegimeClassifier {
    fn fit(&self, candles: &[Candle]) -> Result<()> {
        let rows = feature_rows(candles);
        if rows.len() < self.config.min_fit_rows {
            bail!(
                "insufficient feature rows for regime fit: {} < {}",
                rows.len(),
                self.config.min_fit_rows
            );
        }

        let scaler = match Standardizer::fit(&rows) {
            Some(s) => s,
            None => bail!("feature standardization failed on empty rows"),
        };
        let scaled: Vec<FeatureRow> = rows.iter().map(|r| scaler.transform(r)).collect();

        let mixture = GaussianMixture::new(GmmParams {
            n_components: self.config.n_components,
            max_iter: self.config.max_iter,
            tolerance: 1e-4,
            seed: self.config.seed,
        });
        let fitted_mixture = match mixture.fit(&scaled) {
            Some(m) => m,
            None => bail!("mixture fit did not converge to a usable model"),
        };

        // Per-cluster mean |trend| over hard assignments, in raw units.
        let assignments = fitted_mixture.assign(&scaled);
        let mut trend_sums = vec![0.0_f64; self.config.n_components];
        let mut counts = vec![0usize; self.config.n_components];
        for (row, &cluster) in rows.iter().zip(&assignments) {
            trend_sums[cluster] += row[F_TREND].abs();
            counts[cluster] += 1;
        }
        let cluster_trend: Vec<f64> = trend_sums
            .iter()
            .zip(&counts)
            .map(|(sum, &count)| if count > 0 { sum / count as f64 } else { 0.0 })
            .collect();

        let mut vol_sorted: Vec<f64> = rows.iter().map(|r| r[F_ATR_PCT]).collect();
        vol_sorted.sort_by(f64::total_cmp);

        let snapshot = Arc::new(FittedRegime {
            scaler,
            mixture: fitted_mixture,
            cluster_trend,
            vol_sorted,
        });

        // Atomic swap: concurrent predictions keep the Arc they cloned.
        *self.model.write() = Some(snapshot);

        info!(
            rows = rows.len(),
            components = self.config.n_components,
            "regime model fitted"
        );
        Ok(())
    }

    fn predict(&self, candles: &[Candle]) -> RegimeClassification {
        let fitted = match self.model.read().clone() {
            Some(f) => f,
            None => return RegimeClassification::unknown(),
        };

        let row = match latest_feature_row(candles) {
            Some(r) => r,
            None => return RegimeClassification::unknown(),
        };

        let scaled = fitted.scaler.transform(&row);
        let (cluster, confidence) = fitted.mixture.predict(&scaled);

        if confidence < self.config.min_confidence {
            debug!(cluster, confidence, "low posterior confidence — transitional");
            return RegimeClassification::of(RegimeLabel::Transitional, confidence);
        }

        let label = self.map_to_label(&fitted, &row, cluster);
        RegimeClassification::of(label, confidence)
    }

    fn is_fitted(&self) -> bool {
        self.model.read().is_some()
    }
}

/// Fraction of `sorted` values at or below `value`.
fn percentile_rank(sorted: &[f64], value: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let below = sorted.partition_point(|&v| v <= value);
    below as f64 / sorted.len() as f64
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(i: usize, close: f64, range: f64) -> Candle {
        Candle {
            open_time: i as i64 * 300_000,
            open: close - range * 0.2,
            high: close + range,
            low: close - range,
            close,
            volume: 100.0 + (i % 5) as f64 * 8.0,
            complete: true,
        }
    }

    /// Steady uptrend with mild noise.
    fn uptrend(len: usize) -> Vec<Candle> {
        (0..len)
            .map(|i| candle(i, 100.0 + i as f64 * 0.4 + (i as f64 * 0.9).sin() * 0.3, 0.5))
            .collect()
    }

    #[test]
    fn tradeable_matrix() {
        assert!(RegimeLabel::TrendingUpLowVol.tradeable());
        assert!(RegimeLabel::TrendingDownHighVol.tradeable());
        assert!(RegimeLabel::RangingLowVol.tradeable());
        assert!(!RegimeLabel::RangingHighVol.tradeable());
        assert!(!RegimeLabel::Transitional.tradeable());
        assert!(!RegimeLabel::Unknown.tradeable());
    }

    #[test]
    fn label_display_names() {
        assert_eq!(RegimeLabel::TrendingUpLowVol.to_string(), "trending_up_low_vol");
        assert_eq!(RegimeLabel::Unknown.to_string(), "unknown");
    }

    #[test]
    fn unfitted_model_predicts_unknown() {
        let classifier = GmmRegimeClassifier::new(RegimeConfig::default());
        let result = classifier.predict(&uptrend(200));
        assert_eq!(result.label, RegimeLabel::Unknown);
        assert!(!result.tradeable);
        assert!(!classifier.is_fitted());
    }

    #[test]
    fn fit_rejects_short_history() {
        let classifier = GmmRegimeClassifier::new(RegimeConfig::default());
        assert!(classifier.fit(&uptrend(50)).is_err());
        assert!(!classifier.is_fitted());
    }

    #[test]
    fn fit_then_predict_is_assigned_and_deterministic() {
        let classifier = GmmRegimeClassifier::new(RegimeConfig::default());
        let candles = uptrend(400);
        classifier.fit(&candles).unwrap();
        assert!(classifier.is_fitted());

        let a = classifier.predict(&candles);
        let b = classifier.predict(&candles);
        assert_eq!(a.label, b.label);
        assert!((a.confidence - b.confidence).abs() < 1e-12);
        assert_ne!(a.label, RegimeLabel::Unknown);
    }

    #[test]
    fn insufficient_prediction_window_is_unknown() {
        let classifier = GmmRegimeClassifier::new(RegimeConfig::default());
        classifier.fit(&uptrend(400)).unwrap();
        let result = classifier.predict(&uptrend(10));
        assert_eq!(result.label, RegimeLabel::Unknown);
    }

    #[test]
    fn refit_swaps_model() {
        let classifier = GmmRegimeClassifier::new(RegimeConfig::default());
        classifier.fit(&uptrend(400)).unwrap();
        // A second fit over different data must succeed and replace the
        // snapshot without poisoning readers.
        let downtrend: Vec<Candle> = (0..400)
            .map(|i| candle(i, 300.0 - i as f64 * 0.4, 0.5))
            .collect();
        classifier.fit(&downtrend).unwrap();
        let result = classifier.predict(&downtrend);
        assert_ne!(result.label, RegimeLabel::Unknown);
    }

    #[test]
    fn percentile_rank_bounds() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0];
        assert!((percentile_rank(&sorted, 0.5) - 0.0).abs() < 1e-12);
        assert!((percentile_rank(&sorted, 2.0) - 0.5).abs() < 1e-12);
        assert!((percentile_rank(&sorted, 9.0) - 1.0).abs() < 1e-12);
        assert!((percentile_rank(&[], 1.0) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn direction_distinguishes_same_volatility() {
        // Force the mapping path directly: equal trendiness, opposite signs.
        let classifier = GmmRegimeClassifier::new(RegimeConfig::default());
        let fitted = FittedRegime {
            scaler: Standardizer {
                mean: [0.0; crate::regime::features::FEATURE_DIM],
                std: [1.0; crate::regime::features::FEATURE_DIM],
            },
            mixture: GaussianMixture::new(GmmParams {
                n_components: 1,
                ..GmmParams::default()
            })
            .fit(&vec![[0.0; crate::regime::features::FEATURE_DIM]; 4])
            .unwrap(),
            cluster_trend: vec![0.8],
            vol_sorted: vec![0.1, 0.2, 0.3, 0.4],
        };

        let mut up_row = [0.0; crate::regime::features::FEATURE_DIM];
        up_row[F_TREND] = 0.6;
        up_row[F_ATR_PCT] = 0.15;
        let mut down_row = up_row;
        down_row[F_TREND] = -0.6;

        let up = classifier.map_to_label(&fitted, &up_row, 0);
        let down = classifier.map_to_label(&fitted, &down_row, 0);
        assert_eq!(up, RegimeLabel::TrendingUpLowVol);
        assert_eq!(down, RegimeLabel::TrendingDownLowVol);
    }
}
