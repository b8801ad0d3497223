// =============================================================================
// Engine Configuration — validated settings with atomic save
// =============================================================================
//
// Central configuration for the signal engine. Every field carries a serde
// default so older config files keep loading after new fields are added.
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.
//
// `validate` enforces the construction-time invariants; the engine refuses
// to start on any violation rather than silently misbehaving at runtime:
//   - timeframe weights sum to exactly 1.0
//   - `min_strength` is achievable at `min_votes_required` (strength is a
//     deterministic function of votes, so an inconsistent pair would
//     silently suppress every signal)
//   - risk bounds and hysteresis thresholds are ordered sensibly
//   - per-instrument multipliers and volatility bands are well-formed

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indicators::IndicatorParams;
use crate::market_data::Timeframe;
use crate::regime::RegimeConfig;
use crate::risk::RiskConfig;
use crate::signals::MAX_POSSIBLE_VOTES;

/// Tolerance for the weight-sum check.
const WEIGHT_SUM_EPSILON: f64 = 1e-9;

// =============================================================================
// Default-value helpers
// =============================================================================

fn default_min_votes_required() -> f64 {
    2.5
}
fn default_min_strength() -> f64 {
    25.0
}
fn default_min_adx() -> f64 {
    25.0
}
fn default_cooldown_minutes() -> i64 {
    15
}
fn default_evaluation_interval_secs() -> u64 {
    60
}
fn default_refit_interval_secs() -> u64 {
    3600
}
fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_instruments() -> Vec<InstrumentParams> {
    vec![
        InstrumentParams {
            name: "GBP_USD".to_string(),
            sl_atr_multiplier: 1.5,
            tp_atr_multiplier: 3.0,
            atr_pct_min: 0.02,
            atr_pct_max: 1.0,
            max_spread: 0.0003,
        },
        InstrumentParams {
            name: "XAU_USD".to_string(),
            sl_atr_multiplier: 1.5,
            tp_atr_multiplier: 3.0,
            atr_pct_min: 0.05,
            atr_pct_max: 2.0,
            max_spread: 0.5,
        },
        InstrumentParams {
            name: "USD_JPY".to_string(),
            sl_atr_multiplier: 1.5,
            tp_atr_multiplier: 3.0,
            atr_pct_min: 0.02,
            atr_pct_max: 1.0,
            max_spread: 0.03,
        },
    ]
}

fn default_timeframes() -> Vec<TimeframeSettings> {
    vec![
        TimeframeSettings {
            timeframe: Timeframe::M5,
            weight: 0.40,
            fetch_count: 500,
        },
        TimeframeSettings {
            timeframe: Timeframe::M15,
            weight: 0.35,
            fetch_count: 300,
        },
        TimeframeSettings {
            timeframe: Timeframe::H1,
            weight: 0.25,
            fetch_count: 200,
        },
    ]
}

// =============================================================================
// Per-instrument parameters
// =============================================================================

/// Instrument-specific tunables. Volatility scale differs wildly across
/// instruments (gold moves in dollars, cable in fractions of a cent), so
/// stops, volatility bands and spread limits are all per-instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentParams {
    pub name: String,
    /// ATR multiplier for the stop-loss distance.
    pub sl_atr_multiplier: f64,
    /// ATR multiplier for the take-profit distance.
    pub tp_atr_multiplier: f64,
    /// Quality filter volatility band, in ATR% terms.
    pub atr_pct_min: f64,
    pub atr_pct_max: f64,
    /// Maximum acceptable spread in price units.
    pub max_spread: f64,
}

/// One timeframe's contribution to the weighted vote.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeframeSettings {
    pub timeframe: Timeframe,
    pub weight: f64,
    /// Candle window requested from the provider.
    pub fetch_count: usize,
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_instruments")]
    pub instruments: Vec<InstrumentParams>,

    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<TimeframeSettings>,

    /// Weighted votes the winning side must reach.
    #[serde(default = "default_min_votes_required")]
    pub min_votes_required: f64,

    /// Minimum signal strength percentage.
    #[serde(default = "default_min_strength")]
    pub min_strength: f64,

    /// Minimum ADX for the trend-strength criterion.
    #[serde(default = "default_min_adx")]
    pub min_adx: f64,

    /// Minimum minutes between two signals for the same instrument.
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,

    /// Seconds between evaluation cycles per instrument.
    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,

    /// Seconds between regime-model refits.
    #[serde(default = "default_refit_interval_secs")]
    pub refit_interval_secs: u64,

    /// Hard timeout on each candle fetch.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default)]
    pub indicators: IndicatorParams,

    #[serde(default)]
    pub regime: RegimeConfig,

    #[serde(default)]
    pub risk: RiskConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instruments: default_instruments(),
            timeframes: default_timeframes(),
            min_votes_required: default_min_votes_required(),
            min_strength: default_min_strength(),
            min_adx: default_min_adx(),
            cooldown_minutes: default_cooldown_minutes(),
            evaluation_interval_secs: default_evaluation_interval_secs(),
            refit_interval_secs: default_refit_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            indicators: IndicatorParams::default(),
            regime: RegimeConfig::default(),
            risk: RiskConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            instruments = config.instruments.len(),
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist to `path` atomically (write `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise engine config")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Enforce the construction-time invariants. Any violation is fatal:
    /// the engine must refuse to start.
    pub fn validate(&self) -> Result<()> {
        // --- Instruments -----------------------------------------------------
        if self.instruments.is_empty() {
            bail!("no instruments configured");
        }
        let mut seen = std::collections::HashSet::new();
        for inst in &self.instruments {
            if !seen.insert(inst.name.as_str()) {
                bail!("duplicate instrument: {}", inst.name);
            }
            if inst.sl_atr_multiplier <= 0.0 || inst.tp_atr_multiplier <= 0.0 {
                bail!("{}: SL/TP multipliers must be positive", inst.name);
            }
            if inst.atr_pct_min < 0.0 || inst.atr_pct_min >= inst.atr_pct_max {
                bail!(
                    "{}: invalid volatility band [{}, {}]",
                    inst.name,
                    inst.atr_pct_min,
                    inst.atr_pct_max
                );
            }
            if inst.max_spread < 0.0 {
                bail!("{}: max_spread must be non-negative", inst.name);
            }
        }

        // --- Timeframes and weights ------------------------------------------
        if self.timeframes.is_empty() {
            bail!("no timeframes configured");
        }
        let mut seen_tf = std::collections::HashSet::new();
        for tf in &self.timeframes {
            if !seen_tf.insert(tf.timeframe) {
                bail!("duplicate timeframe: {}", tf.timeframe);
            }
            if tf.weight <= 0.0 {
                bail!("timeframe {} has non-positive weight", tf.timeframe);
            }
            if tf.fetch_count == 0 {
                bail!("timeframe {} has zero fetch_count", tf.timeframe);
            }
        }
        let weight_sum: f64 = self.timeframes.iter().map(|tf| tf.weight).sum();
        if (weight_sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            bail!("timeframe weights must sum to 1.0, got {weight_sum}");
        }

        // --- Decision thresholds ---------------------------------------------
        if self.min_votes_required <= 0.0 || self.min_votes_required > MAX_POSSIBLE_VOTES {
            bail!(
                "min_votes_required {} outside (0, {MAX_POSSIBLE_VOTES}]",
                self.min_votes_required
            );
        }
        if !(0.0..=100.0).contains(&self.min_strength) {
            bail!("min_strength {} outside [0, 100]", self.min_strength);
        }
        // Strength is a deterministic function of votes: a signal clearing
        // the vote threshold must also be able to clear the strength
        // threshold, otherwise emission is impossible.
        let strength_at_vote_threshold = (self.min_votes_required / MAX_POSSIBLE_VOTES) * 100.0;
        if strength_at_vote_threshold < self.min_strength {
            bail!(
                "inconsistent thresholds: min_votes_required {} yields strength {:.1}% \
                 below min_strength {:.1}% — signals could never be emitted",
                self.min_votes_required,
                strength_at_vote_threshold,
                self.min_strength
            );
        }
        if !(0.0..=100.0).contains(&self.min_adx) {
            bail!("min_adx {} outside [0, 100]", self.min_adx);
        }
        if self.cooldown_minutes < 0 {
            bail!("cooldown_minutes must be non-negative");
        }

        // --- Risk ------------------------------------------------------------
        let risk = &self.risk;
        if risk.max_risk_per_trade <= 0.0 || risk.max_risk_per_trade > 1.0 {
            bail!("max_risk_per_trade {} outside (0, 1]", risk.max_risk_per_trade);
        }
        if risk.safe_minimum < 0.0 || risk.safe_minimum > risk.max_risk_per_trade {
            bail!(
                "safe_minimum {} outside [0, max_risk_per_trade]",
                risk.safe_minimum
            );
        }
        if risk.kelly_fraction <= 0.0 || risk.kelly_fraction > 1.0 {
            bail!("kelly_fraction {} outside (0, 1]", risk.kelly_fraction);
        }
        if risk.drawdown_release >= risk.drawdown_trigger {
            bail!(
                "drawdown_release {} must be strictly below drawdown_trigger {}",
                risk.drawdown_release,
                risk.drawdown_trigger
            );
        }
        if risk.drawdown_trigger <= 0.0 || risk.drawdown_trigger >= 1.0 {
            bail!("drawdown_trigger {} outside (0, 1)", risk.drawdown_trigger);
        }
        for (name, factor) in [
            ("recovery_factor", risk.recovery_factor),
            ("high_vol_factor", risk.high_vol_factor),
            ("elevated_vol_factor", risk.elevated_vol_factor),
        ] {
            if factor <= 0.0 || factor > 1.0 {
                bail!("{name} {factor} outside (0, 1]");
            }
        }

        // --- Regime ----------------------------------------------------------
        if self.regime.n_components == 0 {
            bail!("regime n_components must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.regime.min_confidence) {
            bail!("regime min_confidence outside [0, 1]");
        }
        if self.regime.trend_weak > self.regime.trend_strong {
            bail!("regime trend_weak must not exceed trend_strong");
        }

        Ok(())
    }

    /// Timeframe → weight lookup for the aggregator.
    pub fn weight_map(&self) -> HashMap<Timeframe, f64> {
        self.timeframes
            .iter()
            .map(|tf| (tf.timeframe, tf.weight))
            .collect()
    }

    pub fn instrument(&self, name: &str) -> Option<&InstrumentParams> {
        self.instruments.iter().find(|i| i.name == name)
    }
}
