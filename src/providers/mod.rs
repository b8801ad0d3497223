// =============================================================================
// Collaborator interfaces — data in, signals out
// =============================================================================
//
// The engine consumes three read-only collaborators (market data, trade
// history, spread) and produces to signal sinks (persistence,
// notification). All are traits so the thin I/O wrappers around the engine
// stay swappable; the engine itself never knows what sits behind them.

pub mod rest;

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use crate::engine::Signal;
use crate::market_data::{Candle, Timeframe};
use crate::types::TradeHistory;

pub use rest::CandleRestClient;

// =============================================================================
// Consumed collaborators
// =============================================================================

/// Ordered candle windows from an external market-data service. Failures
/// (network, rate limit) surface as errors; the engine skips the cycle.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch(&self, instrument: &str, timeframe: Timeframe, count: usize)
        -> Result<Vec<Candle>>;
}

/// Trailing trade outcomes and the current drawdown fraction. Read-only.
#[async_trait]
pub trait TradeHistoryProvider: Send + Sync {
    async fn history(&self, instrument: &str) -> Result<TradeHistory>;
}

/// Current spread for the quality filter. Read-only.
#[async_trait]
pub trait SpreadProvider: Send + Sync {
    async fn spread(&self, instrument: &str) -> Result<f64>;
}

// =============================================================================
// Produced collaborators
// =============================================================================

/// Receives finalized signals. The engine never reads anything back; wire
/// formats are the sink's concern.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn publish(&self, signal: &Signal) -> Result<()>;
}

// =============================================================================
// In-process implementations
// =============================================================================

/// Trade history held in memory, updated by whatever journals trades.
#[derive(Default)]
pub struct InMemoryTradeHistory {
    histories: RwLock<HashMap<String, TradeHistory>>,
}

impl InMemoryTradeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, instrument: impl Into<String>, history: TradeHistory) {
        self.histories.write().insert(instrument.into(), history);
    }
}

#[async_trait]
impl TradeHistoryProvider for InMemoryTradeHistory {
    async fn history(&self, instrument: &str) -> Result<TradeHistory> {
        Ok(self
            .histories
            .read()
            .get(instrument)
            .cloned()
            .unwrap_or_default())
    }
}

/// Fixed per-instrument spreads, e.g. from configuration, when no live
/// quote feed is wired in.
pub struct StaticSpreadProvider {
    spreads: HashMap<String, f64>,
    fallback: f64,
}

impl StaticSpreadProvider {
    pub fn new(spreads: HashMap<String, f64>, fallback: f64) -> Self {
        Self { spreads, fallback }
    }
}

#[async_trait]
impl SpreadProvider for StaticSpreadProvider {
    async fn spread(&self, instrument: &str) -> Result<f64> {
        Ok(self.spreads.get(instrument).copied().unwrap_or(self.fallback))
    }
}

/// Notification sink that reports signals through the log stream.
pub struct TracingSink;

#[async_trait]
impl SignalSink for TracingSink {
    async fn publish(&self, signal: &Signal) -> Result<()> {
        info!(
            instrument = %signal.instrument,
            direction = %signal.direction,
            strength = signal.strength,
            entry = signal.entry,
            stop_loss = signal.stop_loss,
            take_profit = signal.take_profit,
            risk_fraction = signal.risk_fraction,
            "signal published"
        );
        Ok(())
    }
}

/// Persistence sink appending one JSON document per signal to a local
/// journal file.
pub struct JsonlFileSink {
    path: std::path::PathBuf,
}

impl JsonlFileSink {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SignalSink for JsonlFileSink {
    async fn publish(&self, signal: &Signal) -> Result<()> {
        use std::io::Write;

        let line = serde_json::to_string(signal).context("failed to serialise signal")?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open signal journal {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(())
    }
}
