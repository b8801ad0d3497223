// =============================================================================
// Quality Filter — multi-criteria signal gate with per-instrument cooldown
// =============================================================================
//
// Six criteria, evaluated in order; every criterion's verdict and reason is
// recorded even when an earlier one already failed, so a rejected cycle is
// fully auditable. All must pass for a signal to be emitted.
//
//   1. Volatility band  — ATR% within the instrument's [min, max]
//   2. Strength         — computed strength >= configured minimum
//   3. Trend strength   — ADX >= configured minimum
//   4. Spread           — externally supplied spread <= instrument maximum
//   5. Regime           — the classified regime is tradeable
//   6. Cooldown         — no signal for this instrument inside the window
//
// The cooldown map is owned by the filter and injected into the engine; the
// check-and-reserve runs under a single lock so two overlapping cycles for
// the same instrument can never both pass.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::regime::RegimeClassification;
use crate::runtime_config::InstrumentParams;

// =============================================================================
// Report types
// =============================================================================

/// One criterion's verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityCheck {
    pub name: String,
    pub passed: bool,
    pub reason: String,
}

/// The full set of verdicts plus the aggregate outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub checks: Vec<QualityCheck>,
    pub passed: bool,
}

impl QualityReport {
    /// The first failing criterion, if any.
    pub fn first_failure(&self) -> Option<&QualityCheck> {
        self.checks.iter().find(|c| !c.passed)
    }
}

// =============================================================================
// Cooldown tracker
// =============================================================================

/// Concurrency-safe per-instrument last-signal map.
///
/// `try_acquire` checks and reserves atomically: if the window has elapsed
/// the current time is recorded before the lock is released, so a second
/// overlapping cycle observes the reservation and fails the check.
pub struct CooldownTracker {
    window: Duration,
    last_signal: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_signal: Mutex::new(HashMap::new()),
        }
    }

    /// Check-and-reserve. `Ok(())` reserves `now` as the instrument's last
    /// signal time; `Err(remaining)` reports how long the cooldown still
    /// has to run.
    pub fn try_acquire(&self, instrument: &str, now: DateTime<Utc>) -> Result<(), Duration> {
        let mut map = self.last_signal.lock();
        if let Some(last) = map.get(instrument) {
            let elapsed = now - *last;
            if elapsed < self.window {
                return Err(self.window - elapsed);
            }
        }
        map.insert(instrument.to_string(), now);
        Ok(())
    }

    /// Remaining cooldown without reserving, for reporting on cycles that
    /// already failed another criterion.
    pub fn remaining(&self, instrument: &str, now: DateTime<Utc>) -> Option<Duration> {
        let map = self.last_signal.lock();
        map.get(instrument).and_then(|last| {
            let elapsed = now - *last;
            (elapsed < self.window).then(|| self.window - elapsed)
        })
    }
}

// =============================================================================
// Quality filter
// =============================================================================

/// Inputs gathered by the engine for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct QualityInputs<'a> {
    pub instrument: &'a str,
    pub params: &'a InstrumentParams,
    pub strength: f64,
    pub atr_pct: Option<f64>,
    pub adx: Option<f64>,
    pub spread: f64,
    pub regime: RegimeClassification,
    pub now: DateTime<Utc>,
}

pub struct QualityFilter {
    min_strength: f64,
    min_adx: f64,
    cooldown: CooldownTracker,
}

impl QualityFilter {
    pub fn new(min_strength: f64, min_adx: f64, cooldown_window: Duration) -> Self {
        Self {
            min_strength,
            min_adx,
            cooldown: CooldownTracker::new(cooldown_window),
        }
    }

    /// Evaluate all criteria. The cooldown reservation is only attempted
    /// when every prior criterion passed, so a rejected cycle does not
    /// consume the instrument's cooldown slot.
    pub fn evaluate(&self, inputs: QualityInputs<'_>) -> QualityReport {
        let mut checks = Vec::with_capacity(6);

        // 1. Volatility band.
        let volatility_ok = match inputs.atr_pct {
            Some(atr_pct) => {
                let ok = atr_pct >= inputs.params.atr_pct_min && atr_pct <= inputs.params.atr_pct_max;
                let reason = if ok {
                    format!("atr {atr_pct:.3}% within band")
                } else if atr_pct < inputs.params.atr_pct_min {
                    format!(
                        "volatility too low: {atr_pct:.3}% < {:.3}%",
                        inputs.params.atr_pct_min
                    )
                } else {
                    format!(
                        "volatility too high: {atr_pct:.3}% > {:.3}%",
                        inputs.params.atr_pct_max
                    )
                };
                checks.push(check("volatility", ok, reason));
                ok
            }
            None => {
                checks.push(check(
                    "volatility",
                    false,
                    "atr unavailable (insufficient history)".to_string(),
                ));
                false
            }
        };

        // 2. Minimum strength.
        let strength_ok = inputs.strength >= self.min_strength;
        checks.push(check(
            "strength",
            strength_ok,
            if strength_ok {
                format!("strength {:.1}% >= {:.1}%", inputs.strength, self.min_strength)
            } else {
                format!("strength {:.1}% < {:.1}%", inputs.strength, self.min_strength)
            },
        ));

        // 3. Trend strength.
        let adx_ok = match inputs.adx {
            Some(adx) => {
                let ok = adx >= self.min_adx;
                checks.push(check(
                    "trend_strength",
                    ok,
                    if ok {
                        format!("adx {adx:.1} >= {:.1}", self.min_adx)
                    } else {
                        format!("weak trend: adx {adx:.1} < {:.1}", self.min_adx)
                    },
                ));
                ok
            }
            None => {
                checks.push(check(
                    "trend_strength",
                    false,
                    "adx unavailable (insufficient history)".to_string(),
                ));
                false
            }
        };

        // 4. Spread.
        let spread_ok = inputs.spread <= inputs.params.max_spread;
        checks.push(check(
            "spread",
            spread_ok,
            if spread_ok {
                format!("spread {:.5} <= {:.5}", inputs.spread, inputs.params.max_spread)
            } else {
                format!(
                    "spread too wide: {:.5} > {:.5}",
                    inputs.spread, inputs.params.max_spread
                )
            },
        ));

        // 5. Regime eligibility.
        let regime_ok = inputs.regime.tradeable;
        checks.push(check(
            "regime",
            regime_ok,
            if regime_ok {
                format!("regime {} tradeable", inputs.regime.label)
            } else {
                format!("regime {} not tradeable", inputs.regime.label)
            },
        ));

        // 6. Cooldown — reserve only when everything else already passed.
        let prior_ok = volatility_ok && strength_ok && adx_ok && spread_ok && regime_ok;
        let cooldown_ok = if prior_ok {
            match self.cooldown.try_acquire(inputs.instrument, inputs.now) {
                Ok(()) => {
                    checks.push(check("cooldown", true, "cooldown clear".to_string()));
                    true
                }
                Err(remaining) => {
                    checks.push(check(
                        "cooldown",
                        false,
                        format!("cooldown active for {}s", remaining.num_seconds()),
                    ));
                    false
                }
            }
        } else {
            match self.cooldown.remaining(inputs.instrument, inputs.now) {
                Some(remaining) => {
                    checks.push(check(
                        "cooldown",
                        false,
                        format!("cooldown active for {}s", remaining.num_seconds()),
                    ));
                    false
                }
                None => {
                    checks.push(check("cooldown", true, "cooldown clear".to_string()));
                    true
                }
            }
        };

        QualityReport {
            passed: prior_ok && cooldown_ok,
            checks,
        }
    }
}

fn check(name: &str, passed: bool, reason: String) -> QualityCheck {
    QualityCheck {
        name: name.to_string(),
        passed,
        reason,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::RegimeLabel;

    fn params() -> InstrumentParams {
        InstrumentParams {
            name: "GBP_USD".to_string(),
            sl_atr_multiplier: 1.5,
            tp_atr_multiplier: 3.0,
            atr_pct_min: 0.02,
            atr_pct_max: 1.0,
            max_spread: 0.0003,
        }
    }

    fn tradeable_regime() -> RegimeClassification {
        RegimeClassification {
            label: RegimeLabel::TrendingUpLowVol,
            tradeable: true,
            confidence: 0.9,
        }
    }

    fn good_inputs<'a>(instrument: &'a str, p: &'a InstrumentParams) -> QualityInputs<'a> {
        QualityInputs {
            instrument,
            params: p,
            strength: 65.0,
            atr_pct: Some(0.07),
            adx: Some(28.0),
            spread: 0.0002,
            regime: tradeable_regime(),
            now: Utc::now(),
        }
    }

    fn filter() -> QualityFilter {
        QualityFilter::new(25.0, 25.0, Duration::minutes(15))
    }

    #[test]
    fn all_criteria_pass() {
        let p = params();
        let report = filter().evaluate(good_inputs("GBP_USD", &p));
        assert!(report.passed, "report: {report:?}");
        assert_eq!(report.checks.len(), 6);
        assert!(report.checks.iter().all(|c| c.passed));
        assert!(report.first_failure().is_none());
    }

    #[test]
    fn dead_market_rejected() {
        let p = params();
        let mut inputs = good_inputs("GBP_USD", &p);
        inputs.atr_pct = Some(0.005);
        let report = filter().evaluate(inputs);
        assert!(!report.passed);
        assert_eq!(report.first_failure().unwrap().name, "volatility");
    }

    #[test]
    fn explosive_market_rejected() {
        let p = params();
        let mut inputs = good_inputs("GBP_USD", &p);
        inputs.atr_pct = Some(1.4);
        let report = filter().evaluate(inputs);
        assert!(!report.passed);
        assert!(report.first_failure().unwrap().reason.contains("too high"));
    }

    #[test]
    fn missing_atr_fails_volatility() {
        let p = params();
        let mut inputs = good_inputs("GBP_USD", &p);
        inputs.atr_pct = None;
        let report = filter().evaluate(inputs);
        assert!(!report.passed);
        assert_eq!(report.first_failure().unwrap().name, "volatility");
    }

    #[test]
    fn all_verdicts_recorded_on_early_failure() {
        let p = params();
        let mut inputs = good_inputs("GBP_USD", &p);
        inputs.atr_pct = Some(0.001); // fails criterion 1
        inputs.spread = 0.01; // would also fail criterion 4
        let report = filter().evaluate(inputs);
        assert_eq!(report.checks.len(), 6);
        let spread_check = report.checks.iter().find(|c| c.name == "spread").unwrap();
        assert!(!spread_check.passed);
    }

    #[test]
    fn weak_strength_rejected() {
        let p = params();
        let mut inputs = good_inputs("GBP_USD", &p);
        inputs.strength = 10.0;
        let report = filter().evaluate(inputs);
        assert!(!report.passed);
    }

    #[test]
    fn untradeable_regime_rejected() {
        let p = params();
        let mut inputs = good_inputs("GBP_USD", &p);
        inputs.regime = RegimeClassification::unknown();
        let report = filter().evaluate(inputs);
        assert!(!report.passed);
        let regime_check = report.checks.iter().find(|c| c.name == "regime").unwrap();
        assert!(!regime_check.passed);
    }

    #[test]
    fn cooldown_allows_at_most_one_signal_per_window() {
        let p = params();
        let f = filter();
        let now = Utc::now();

        let mut first = good_inputs("GBP_USD", &p);
        first.now = now;
        assert!(f.evaluate(first).passed);

        // Second cycle inside the window: everything else passes but the
        // cooldown reservation is taken.
        let mut second = good_inputs("GBP_USD", &p);
        second.now = now + Duration::minutes(5);
        let report = f.evaluate(second);
        assert!(!report.passed);
        assert_eq!(report.first_failure().unwrap().name, "cooldown");

        // After the window the instrument is eligible again.
        let mut third = good_inputs("GBP_USD", &p);
        third.now = now + Duration::minutes(16);
        assert!(f.evaluate(third).passed);
    }

    #[test]
    fn cooldown_is_per_instrument() {
        let p = params();
        let f = filter();
        let now = Utc::now();

        let mut a = good_inputs("GBP_USD", &p);
        a.now = now;
        assert!(f.evaluate(a).passed);

        let mut b = good_inputs("USD_JPY", &p);
        b.now = now;
        assert!(f.evaluate(b).passed);
    }

    #[test]
    fn failed_cycle_does_not_reserve_cooldown() {
        let p = params();
        let f = filter();
        let now = Utc::now();

        // Fails the strength criterion — must not consume the slot.
        let mut weak = good_inputs("GBP_USD", &p);
        weak.strength = 1.0;
        weak.now = now;
        assert!(!f.evaluate(weak).passed);

        let mut strong = good_inputs("GBP_USD", &p);
        strong.now = now + Duration::seconds(1);
        assert!(f.evaluate(strong).passed);
    }

    #[test]
    fn tracker_try_acquire_atomicity() {
        let tracker = CooldownTracker::new(Duration::minutes(10));
        let now = Utc::now();
        assert!(tracker.try_acquire("XAU_USD", now).is_ok());
        let err = tracker.try_acquire("XAU_USD", now + Duration::minutes(1));
        assert!(err.is_err());
        let remaining = err.unwrap_err();
        assert_eq!(remaining.num_minutes(), 9);
    }
}
