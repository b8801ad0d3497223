// =============================================================================
// Signal Engine — the full per-instrument evaluation pipeline
// =============================================================================
//
// One evaluation runs the stages strictly downward; no stage mutates
// another's output:
//
//   1. Classify the regime from the primary (M5) window
//   2. Compute indicator snapshots per timeframe (regime-dependent
//      Bollinger width)
//   3. Vote per timeframe, aggregate with the configured weights
//   4. Apply the decision rule; no winner => NO_ACTION with tallies kept
//   5. Run the quality filter; any failure => NO_ACTION with the report
//   6. Size the trade (Kelly + volatility + drawdown adjustments) and
//      compute ATR-scaled protective levels
//   7. Assemble the immutable, fully audited Signal
//
// A `Signal` is constructed if and only if the quality report passed;
// there is no partial construction and nothing mutates a signal after
// assembly.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::indicators::{compute_snapshot, IndicatorSnapshot};
use crate::market_data::{Timeframe, TimeframeSeries};
use crate::quality::{QualityFilter, QualityInputs, QualityReport};
use crate::regime::{RegimeClassification, RegimeModel};
use crate::risk::{median, protective_levels, RiskSizer};
use crate::runtime_config::EngineConfig;
use crate::signals::{aggregate, decide, vote_timeframe, RegimePolicy, VoteTally};
use crate::types::{Direction, TradeHistory};

/// The timeframe whose window drives regime classification, quality
/// metrics and entry pricing.
pub const PRIMARY_TIMEFRAME: Timeframe = Timeframe::M5;

// =============================================================================
// Terminal types
// =============================================================================

/// A fully audited trade signal. Immutable once assembled; any status
/// lifecycle (pending / active / closed) belongs to the persistence
/// collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub id: String,
    pub instrument: String,
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Winning weighted votes as a percentage of the maximum possible.
    pub strength: f64,
    /// Recommended position risk as a fraction of account balance.
    pub risk_fraction: f64,
    pub votes: VoteTally,
    pub regime: RegimeClassification,
    pub quality: QualityReport,
    pub created_at: String,
}

/// An audited non-emission: why the cycle produced nothing, with whatever
/// diagnostics were computed before the pipeline stopped.
#[derive(Debug, Clone, Serialize)]
pub struct NoActionReport {
    pub instrument: String,
    pub reason: String,
    pub regime: RegimeClassification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<VoteTally>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
    pub created_at: String,
}

/// Outcome of one evaluation cycle. Provider failures surface separately
/// as errors at the fetch boundary, before this pipeline runs.
#[derive(Debug, Clone, Serialize)]
pub enum EngineVerdict {
    Emitted(Box<Signal>),
    NoAction(NoActionReport),
}

// =============================================================================
// Evaluation context
// =============================================================================

/// Everything one evaluation needs beyond the candle windows. All borrows:
/// the engine owns nothing and mutates nothing except the cooldown
/// reservation inside the quality filter.
pub struct EvaluationContext<'a> {
    pub config: &'a EngineConfig,
    pub regime_model: &'a dyn RegimeModel,
    pub quality: &'a QualityFilter,
    pub risk: &'a RiskSizer,
    pub history: &'a TradeHistory,
    /// Current spread in price units, from the spread collaborator.
    pub spread: f64,
    pub now: DateTime<Utc>,
}

// =============================================================================
// The engine
// =============================================================================

pub struct SignalEngine;

impl SignalEngine {
    /// Evaluate one instrument over its fetched timeframe windows.
    pub fn evaluate(
        instrument: &str,
        windows: &HashMap<Timeframe, TimeframeSeries>,
        ctx: &EvaluationContext<'_>,
    ) -> Result<EngineVerdict> {
        let params = ctx
            .config
            .instrument(instrument)
            .with_context(|| format!("no configuration for instrument {instrument}"))?;

        let primary = windows
            .get(&PRIMARY_TIMEFRAME)
            .with_context(|| format!("{instrument}: missing {PRIMARY_TIMEFRAME} window"))?;

        // ── 1. Regime ────────────────────────────────────────────────────
        let regime = ctx.regime_model.predict(primary.candles());
        debug!(
            instrument,
            regime = %regime.label,
            confidence = regime.confidence,
            "regime classified"
        );

        // ── 2 & 3. Snapshots and votes per timeframe ─────────────────────
        let policy = RegimePolicy::for_regime(regime.label);
        let indicator_params = ctx
            .config
            .indicators
            .with_bollinger_std(policy.bollinger_num_std);

        let mut primary_snapshot: Option<IndicatorSnapshot> = None;
        let mut timeframe_votes = Vec::with_capacity(ctx.config.timeframes.len());

        for tf in &ctx.config.timeframes {
            let series = windows
                .get(&tf.timeframe)
                .with_context(|| format!("{instrument}: missing {} window", tf.timeframe))?;

            let snapshot = compute_snapshot(series.candles(), &indicator_params);
            timeframe_votes.push(vote_timeframe(tf.timeframe, &snapshot, regime.label));

            if tf.timeframe == PRIMARY_TIMEFRAME {
                primary_snapshot = Some(snapshot);
            }
        }

        let primary_snapshot =
            primary_snapshot.with_context(|| format!("{instrument}: primary timeframe not configured"))?;

        // ── 4. Aggregate and decide ──────────────────────────────────────
        let tally = aggregate(timeframe_votes, &ctx.config.weight_map());
        let decision = decide(&tally, ctx.config.min_votes_required);

        let direction = match decision.direction {
            Some(direction) => direction,
            None => {
                let reason = format!(
                    "votes below threshold: buy {:.2}, sell {:.2}, required {:.2}",
                    tally.weighted_buy, tally.weighted_sell, ctx.config.min_votes_required
                );
                debug!(instrument, %reason, "no action");
                return Ok(EngineVerdict::NoAction(NoActionReport {
                    instrument: instrument.to_string(),
                    reason,
                    regime,
                    votes: Some(tally),
                    quality: None,
                    created_at: ctx.now.to_rfc3339(),
                }));
            }
        };

        // ── 5. Quality filter ────────────────────────────────────────────
        let quality = ctx.quality.evaluate(QualityInputs {
            instrument,
            params,
            strength: decision.strength,
            atr_pct: primary_snapshot.atr_pct,
            adx: primary_snapshot.adx,
            spread: ctx.spread,
            regime,
            now: ctx.now,
        });

        if !quality.passed {
            let reason = quality
                .first_failure()
                .map(|c| c.reason.clone())
                .unwrap_or_else(|| "quality filter rejected".to_string());
            debug!(instrument, %reason, "quality rejection");
            return Ok(EngineVerdict::NoAction(NoActionReport {
                instrument: instrument.to_string(),
                reason,
                regime,
                votes: Some(tally),
                quality: Some(quality),
                created_at: ctx.now.to_rfc3339(),
            }));
        }

        // ── 6. Risk sizing and levels ────────────────────────────────────
        let entry = primary_snapshot
            .close
            .with_context(|| format!("{instrument}: empty primary window"))?;
        let atr = primary_snapshot
            .atr
            .with_context(|| format!("{instrument}: ATR undefined after quality pass"))?;

        let vol_ratio = volatility_ratio(primary.candles(), ctx.config.indicators.atr_period);
        let risk_fraction = ctx.risk.risk_fraction(ctx.history, vol_ratio);
        let levels = protective_levels(entry, atr, direction, params);

        // ── 7. Assemble ──────────────────────────────────────────────────
        let signal = Signal {
            id: uuid::Uuid::new_v4().to_string(),
            instrument: instrument.to_string(),
            direction,
            entry,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
            strength: decision.strength,
            risk_fraction,
            votes: tally,
            regime,
            quality,
            created_at: ctx.now.to_rfc3339(),
        };

        info!(
            instrument,
            direction = %signal.direction,
            strength = signal.strength,
            entry = signal.entry,
            stop_loss = signal.stop_loss,
            take_profit = signal.take_profit,
            risk_fraction = signal.risk_fraction,
            regime = %signal.regime.label,
            "signal emitted"
        );

        Ok(EngineVerdict::Emitted(Box::new(signal)))
    }
}

/// Current ATR% over its trailing median for the volatility-regime sizing
/// factor. `None` when the window cannot produce a distribution.
fn volatility_ratio(candles: &[crate::market_data::Candle], atr_period: usize) -> Option<f64> {
    let series = crate::indicators::atr::atr_pct_series(candles, atr_period);
    let current = *series.last()?;
    let trailing = median(&series)?;
    if trailing <= 0.0 {
        return None;
    }
    Some(current / trailing)
}
