// =============================================================================
// Risk Sizer — fractional Kelly with volatility and drawdown adjustments
// =============================================================================
//
// Position risk for a passing signal:
//
//   f = (p * b - q) / b          (Kelly; p = win rate, b = avg win / avg loss)
//   f' = f * kelly_fraction      (conservative scalar, e.g. 0.25)
//   f'' = f' * vol_factor * recovery_factor
//   result = clamp(f'', 0, max_risk_per_trade)
//
// Degenerate histories (no trades, no losses, or fewer than the minimum
// sample) return the configured safe minimum instead of dividing by zero.
//
// The drawdown "recovery mode" has hysteresis: risk is reduced once
// drawdown crosses the trigger threshold and is only restored after it
// falls below the strictly lower release threshold, so oscillation between
// the two thresholds cannot flap the sizing.
//
// Stop and target levels are ATR-scaled with per-instrument multipliers —
// volatility scale differs wildly across instruments (metals vs currency
// pairs).

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runtime_config::InstrumentParams;
use crate::types::{Direction, TradeHistory};

// =============================================================================
// Configuration
// =============================================================================

fn default_kelly_fraction() -> f64 {
    0.25
}
fn default_min_trades() -> usize {
    20
}
fn default_safe_minimum() -> f64 {
    0.005
}
fn default_max_risk_per_trade() -> f64 {
    0.02
}
fn default_drawdown_trigger() -> f64 {
    0.10
}
fn default_drawdown_release() -> f64 {
    0.05
}
fn default_recovery_factor() -> f64 {
    0.5
}
fn default_high_vol_ratio() -> f64 {
    1.5
}
fn default_high_vol_factor() -> f64 {
    0.5
}
fn default_elevated_vol_ratio() -> f64 {
    1.2
}
fn default_elevated_vol_factor() -> f64 {
    0.75
}

/// Risk sizing parameters. Validated by `EngineConfig::validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Fraction of full Kelly actually used.
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: f64,

    /// Minimum trade sample before Kelly is trusted.
    #[serde(default = "default_min_trades")]
    pub min_trades: usize,

    /// Risk fraction returned for degenerate or too-small histories.
    #[serde(default = "default_safe_minimum")]
    pub safe_minimum: f64,

    /// Hard upper bound on the per-trade risk fraction.
    #[serde(default = "default_max_risk_per_trade")]
    pub max_risk_per_trade: f64,

    /// Drawdown fraction at which recovery mode engages.
    #[serde(default = "default_drawdown_trigger")]
    pub drawdown_trigger: f64,

    /// Drawdown fraction below which recovery mode disengages. Must be
    /// strictly lower than the trigger.
    #[serde(default = "default_drawdown_release")]
    pub drawdown_release: f64,

    /// Multiplier applied while recovery mode is engaged.
    #[serde(default = "default_recovery_factor")]
    pub recovery_factor: f64,

    /// Current ATR% over its trailing median at which volatility reads as
    /// high, and the multiplier applied there.
    #[serde(default = "default_high_vol_ratio")]
    pub high_vol_ratio: f64,
    #[serde(default = "default_high_vol_factor")]
    pub high_vol_factor: f64,

    /// Intermediate volatility tier.
    #[serde(default = "default_elevated_vol_ratio")]
    pub elevated_vol_ratio: f64,
    #[serde(default = "default_elevated_vol_factor")]
    pub elevated_vol_factor: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            kelly_fraction: default_kelly_fraction(),
            min_trades: default_min_trades(),
            safe_minimum: default_safe_minimum(),
            max_risk_per_trade: default_max_risk_per_trade(),
            drawdown_trigger: default_drawdown_trigger(),
            drawdown_release: default_drawdown_release(),
            recovery_factor: default_recovery_factor(),
            high_vol_ratio: default_high_vol_ratio(),
            high_vol_factor: default_high_vol_factor(),
            elevated_vol_ratio: default_elevated_vol_ratio(),
            elevated_vol_factor: default_elevated_vol_factor(),
        }
    }
}

// =============================================================================
// Protective levels
// =============================================================================

/// ATR-scaled stop and target around an entry price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProtectiveLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Compute stop and target for an entry. Stop and target always sit on
/// opposite sides of the entry.
pub fn protective_levels(
    entry: f64,
    atr: f64,
    direction: Direction,
    params: &InstrumentParams,
) -> ProtectiveLevels {
    let sl_distance = atr * params.sl_atr_multiplier;
    let tp_distance = atr * params.tp_atr_multiplier;

    match direction {
        Direction::Buy => ProtectiveLevels {
            stop_loss: entry - sl_distance,
            take_profit: entry + tp_distance,
        },
        Direction::Sell => ProtectiveLevels {
            stop_loss: entry + sl_distance,
            take_profit: entry - tp_distance,
        },
    }
}

// =============================================================================
// Risk sizer
// =============================================================================

/// Stateful sizer: the only mutable state is the recovery-mode flag, which
/// carries the hysteresis between evaluations.
pub struct RiskSizer {
    config: RiskConfig,
    in_recovery: RwLock<bool>,
}

impl RiskSizer {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            in_recovery: RwLock::new(false),
        }
    }

    /// Compute the position-risk fraction for one signal.
    ///
    /// `vol_ratio` is the current ATR% divided by its trailing median
    /// (`None` when the trailing window is unavailable — no adjustment).
    /// Always returns a value in `[0, max_risk_per_trade]`.
    pub fn risk_fraction(&self, history: &TradeHistory, vol_ratio: Option<f64>) -> f64 {
        let base = match self.kelly(history) {
            Some(kelly) => kelly,
            // Degenerate history: the configured safe minimum, exactly.
            None => return self.config.safe_minimum.min(self.config.max_risk_per_trade),
        };

        let vol_factor = self.volatility_factor(vol_ratio);
        let recovery_factor = self.recovery_factor(history.drawdown);

        let fraction = (base * vol_factor * recovery_factor)
            .clamp(0.0, self.config.max_risk_per_trade);

        debug!(
            base,
            vol_factor,
            recovery_factor,
            fraction,
            drawdown = history.drawdown,
            "risk fraction computed"
        );
        fraction
    }

    /// Fractional Kelly from the trailing sample. `None` marks a
    /// degenerate history (insufficient trades, no wins to measure, or no
    /// losses to divide by).
    fn kelly(&self, history: &TradeHistory) -> Option<f64> {
        let total = history.outcomes.len();
        if total < self.config.min_trades {
            return None;
        }

        let wins = history.win_count();
        let losses = total - wins;
        if wins == 0 || losses == 0 {
            return None;
        }

        let p = wins as f64 / total as f64;
        let q = 1.0 - p;

        let avg_win = history
            .outcomes
            .iter()
            .filter(|t| t.is_win())
            .map(|t| t.pnl)
            .sum::<f64>()
            / wins as f64;
        let avg_loss = history
            .outcomes
            .iter()
            .filter(|t| !t.is_win())
            .map(|t| t.pnl.abs())
            .sum::<f64>()
            / losses as f64;

        if avg_loss <= 0.0 || avg_win <= 0.0 {
            return None;
        }

        let b = avg_win / avg_loss;
        let kelly = (p * b - q) / b;

        // Negative edge sizes to zero rather than the safe minimum.
        Some((kelly * self.config.kelly_fraction).max(0.0))
    }

    fn volatility_factor(&self, vol_ratio: Option<f64>) -> f64 {
        match vol_ratio {
            Some(ratio) if ratio >= self.config.high_vol_ratio => self.config.high_vol_factor,
            Some(ratio) if ratio >= self.config.elevated_vol_ratio => {
                self.config.elevated_vol_factor
            }
            _ => 1.0,
        }
    }

    /// Hysteresis: engage at the trigger, release only strictly below the
    /// release threshold.
    fn recovery_factor(&self, drawdown: f64) -> f64 {
        let mut in_recovery = self.in_recovery.write();
        if *in_recovery {
            if drawdown < self.config.drawdown_release {
                *in_recovery = false;
                debug!(drawdown, "recovery mode released");
            }
        } else if drawdown >= self.config.drawdown_trigger {
            *in_recovery = true;
            debug!(drawdown, "recovery mode engaged");
        }

        if *in_recovery {
            self.config.recovery_factor
        } else {
            1.0
        }
    }

    /// Whether recovery mode is currently engaged.
    pub fn in_recovery(&self) -> bool {
        *self.in_recovery.read()
    }
}

/// Trailing median of a sample, used for the volatility ratio.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
