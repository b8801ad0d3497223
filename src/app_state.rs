// =============================================================================
// Central Engine State — Meridian Signal Engine
// =============================================================================
//
// Ties the shared components together for the per-instrument pipeline
// tasks. The pipelines themselves are pure; the only shared mutable state
// is the quality filter's cooldown map, the risk sizer's recovery flag,
// the per-instrument regime model snapshots, and the audit ring buffers
// kept here.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for the mutable collections.
//   - Arc-wrapped collaborators that manage their own interior mutability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::engine::EngineVerdict;
use crate::providers::{MarketDataProvider, SignalSink, SpreadProvider, TradeHistoryProvider};
use crate::quality::QualityFilter;
use crate::regime::GmmRegimeClassifier;
use crate::risk::RiskSizer;
use crate::runtime_config::EngineConfig;

/// Maximum retained audit records.
const MAX_RECENT_VERDICTS: usize = 100;
/// Maximum retained error records.
const MAX_RECENT_ERRORS: usize = 50;

// =============================================================================
// Audit records
// =============================================================================

/// Compact audit entry for one evaluation cycle.
#[derive(Debug, Clone, Serialize)]
pub struct VerdictRecord {
    pub instrument: String,
    /// "emitted" or "no_action".
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub strength: f64,
    pub regime: String,
    pub at: String,
}

/// A recorded error event.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub at: String,
}

// =============================================================================
// AppState
// =============================================================================

/// Shared state across all async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter, incremented on every
    /// meaningful state mutation.
    pub state_version: AtomicU64,

    pub config: Arc<RwLock<EngineConfig>>,

    // ── Collaborators ───────────────────────────────────────────────────
    pub market_data: Arc<dyn MarketDataProvider>,
    pub trade_history: Arc<dyn TradeHistoryProvider>,
    pub spread: Arc<dyn SpreadProvider>,
    pub sinks: Vec<Arc<dyn SignalSink>>,

    // ── Engine components ───────────────────────────────────────────────
    /// One regime classifier per instrument; each swaps its fitted model
    /// atomically on refit. The map itself is fixed at startup.
    pub classifiers: HashMap<String, Arc<GmmRegimeClassifier>>,
    pub quality: QualityFilter,
    pub risk: RiskSizer,

    // ── Audit trail ─────────────────────────────────────────────────────
    pub recent_verdicts: RwLock<Vec<VerdictRecord>>,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,
}

impl AppState {
    /// Construct from a validated configuration and the collaborator set.
    pub fn new(
        config: EngineConfig,
        market_data: Arc<dyn MarketDataProvider>,
        trade_history: Arc<dyn TradeHistoryProvider>,
        spread: Arc<dyn SpreadProvider>,
        sinks: Vec<Arc<dyn SignalSink>>,
    ) -> Self {
        let classifiers = config
            .instruments
            .iter()
            .map(|inst| {
                (
                    inst.name.clone(),
                    Arc::new(GmmRegimeClassifier::new(config.regime.clone())),
                )
            })
            .collect();

        let quality = QualityFilter::new(
            config.min_strength,
            config.min_adx,
            chrono::Duration::minutes(config.cooldown_minutes),
        );
        let risk = RiskSizer::new(config.risk.clone());

        Self {
            state_version: AtomicU64::new(1),
            config: Arc::new(RwLock::new(config)),
            market_data,
            trade_history,
            spread,
            sinks,
            classifiers,
            quality,
            risk,
            recent_verdicts: RwLock::new(Vec::new()),
            recent_errors: RwLock::new(Vec::new()),
        }
    }

    // ── Version management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Audit trail ─────────────────────────────────────────────────────

    /// Record the outcome of one evaluation cycle in the bounded audit
    /// ring.
    pub fn record_verdict(&self, verdict: &EngineVerdict) {
        let record = match verdict {
            EngineVerdict::Emitted(signal) => VerdictRecord {
                instrument: signal.instrument.clone(),
                outcome: "emitted".to_string(),
                direction: Some(signal.direction.to_string()),
                reason: None,
                strength: signal.strength,
                regime: signal.regime.label.to_string(),
                at: signal.created_at.clone(),
            },
            EngineVerdict::NoAction(report) => VerdictRecord {
                instrument: report.instrument.clone(),
                outcome: "no_action".to_string(),
                direction: None,
                reason: Some(report.reason.clone()),
                strength: 0.0,
                regime: report.regime.label.to_string(),
                at: report.created_at.clone(),
            },
        };

        let mut verdicts = self.recent_verdicts.write();
        verdicts.push(record);
        while verdicts.len() > MAX_RECENT_VERDICTS {
            verdicts.remove(0);
        }
        drop(verdicts);

        self.increment_version();
    }

    /// Record an error in the bounded error ring.
    pub fn push_error(&self, message: String) {
        let mut errors = self.recent_errors.write();
        errors.push(ErrorRecord {
            message,
            at: Utc::now().to_rfc3339(),
        });
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);

        self.increment_version();
    }
}
