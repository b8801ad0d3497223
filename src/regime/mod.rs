// =============================================================================
// Regime Classification Module
// =============================================================================
//
// Market regime classification from rolling statistical features:
// - Feature extraction (returns, volatility, skewness, kurtosis, signed
//   trend strength, ATR%, volume ratio) with z-score standardization
// - A seeded Gaussian mixture model fitted in batch over the feature window
// - A deterministic cluster-to-label mapping producing one of eight regimes
//   plus a `tradeable` verdict

pub mod classifier;
pub mod features;
pub mod gmm;

pub use classifier::{GmmRegimeClassifier, RegimeClassification, RegimeConfig, RegimeLabel, RegimeModel};
pub use features::{FeatureRow, Standardizer, FEATURE_DIM};
pub use gmm::{FittedGmm, GaussianMixture, GmmParams};
