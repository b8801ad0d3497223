// =============================================================================
// Meridian Signal Engine — Main Entry Point
// =============================================================================
//
// Per-instrument evaluation pipelines run as independent tasks: candle
// windows for all timeframes are fetched concurrently, the signal pipeline
// scores them, and emitted signals go to the configured sinks. A fetch
// failure or timeout skips that instrument's cycle only; sibling
// instruments are unaffected. A background task periodically refits each
// instrument's regime model, swapping the snapshot atomically.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod app_state;
mod engine;
mod indicators;
mod market_data;
mod providers;
mod quality;
mod regime;
mod risk;
mod runtime_config;
mod signals;
mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::engine::{EngineVerdict, EvaluationContext, SignalEngine, PRIMARY_TIMEFRAME};
use crate::market_data::fetch_timeframes;
use crate::providers::{
    CandleRestClient, InMemoryTradeHistory, JsonlFileSink, MarketDataProvider, SignalSink,
    SpreadProvider, StaticSpreadProvider, TracingSink, TradeHistoryProvider,
};
use crate::regime::RegimeModel;
use crate::runtime_config::EngineConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Meridian Signal Engine — starting up");

    let mut config = EngineConfig::load("engine_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        EngineConfig::default()
    });

    // Restrict to a subset of the configured instruments via env.
    if let Ok(names) = std::env::var("MERIDIAN_INSTRUMENTS") {
        let wanted: Vec<String> = names
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        config.instruments.retain(|i| wanted.contains(&i.name));
    }

    // Configuration errors are fatal: refuse to start rather than silently
    // misbehave at runtime.
    config.validate().context("invalid engine configuration")?;

    info!(
        instruments = ?config.instruments.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
        timeframes = config.timeframes.len(),
        "engine configuration validated"
    );

    // ── 2. Collaborators ─────────────────────────────────────────────────
    let api_url = std::env::var("MERIDIAN_API_URL")
        .unwrap_or_else(|_| "https://api-fxpractice.oanda.com".to_string());
    let api_token = std::env::var("MERIDIAN_API_TOKEN").unwrap_or_default();
    let market_data = Arc::new(CandleRestClient::new(api_url, &api_token));

    let trade_history = Arc::new(InMemoryTradeHistory::new());
    // Stand-in quote source until a live spread collaborator is wired in.
    let spread = Arc::new(StaticSpreadProvider::new(HashMap::new(), 0.0));

    let sinks: Vec<Arc<dyn SignalSink>> = vec![
        Arc::new(JsonlFileSink::new("signals.jsonl")),
        Arc::new(TracingSink),
    ];

    // ── 3. Shared state ──────────────────────────────────────────────────
    let state = Arc::new(AppState::new(
        config,
        market_data,
        trade_history,
        spread,
        sinks,
    ));

    // ── 4. Regime refit loop ─────────────────────────────────────────────
    let refit_state = state.clone();
    tokio::spawn(async move {
        let refit_secs = refit_state.config.read().refit_interval_secs;
        let mut interval = tokio::time::interval(Duration::from_secs(refit_secs.max(1)));
        loop {
            interval.tick().await;
            let instruments: Vec<String> = refit_state
                .config
                .read()
                .instruments
                .iter()
                .map(|i| i.name.clone())
                .collect();

            for instrument in instruments {
                if let Err(e) = refit_regime_model(&refit_state, &instrument).await {
                    // Cold start is expected: predictions stay Unknown until
                    // the first successful fit.
                    warn!(instrument = %instrument, error = %e, "regime refit skipped");
                }
            }
        }
    });

    // ── 5. Per-instrument evaluation loops ───────────────────────────────
    let instruments: Vec<String> = state
        .config
        .read()
        .instruments
        .iter()
        .map(|i| i.name.clone())
        .collect();

    for instrument in &instruments {
        let loop_state = state.clone();
        let instrument = instrument.clone();
        tokio::spawn(async move {
            let eval_secs = loop_state.config.read().evaluation_interval_secs;
            let mut interval = tokio::time::interval(Duration::from_secs(eval_secs.max(1)));
            loop {
                interval.tick().await;
                if let Err(e) = run_instrument_cycle(&loop_state, &instrument).await {
                    // Skip this cycle only; siblings and the next tick are
                    // unaffected.
                    error!(instrument = %instrument, error = %e, "cycle skipped");
                    loop_state.push_error(format!("{instrument}: {e}"));
                }
            }
        });
    }

    info!(count = instruments.len(), "evaluation pipelines running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping");
    info!("Meridian Signal Engine shut down complete.");
    Ok(())
}

/// One full evaluation cycle for one instrument: fetch all timeframes
/// concurrently, evaluate the pipeline, record the verdict, publish any
/// emitted signal.
async fn run_instrument_cycle(state: &Arc<AppState>, instrument: &str) -> Result<()> {
    let config = state.config.read().clone();

    let windows = fetch_timeframes(
        &state.market_data,
        instrument,
        &config.timeframes,
        Duration::from_secs(config.fetch_timeout_secs),
    )
    .await?;

    let history = state.trade_history.history(instrument).await?;
    let spread = state.spread.spread(instrument).await?;

    let classifier = state
        .classifiers
        .get(instrument)
        .with_context(|| format!("no classifier for {instrument}"))?;

    let ctx = EvaluationContext {
        config: &config,
        regime_model: classifier.as_ref(),
        quality: &state.quality,
        risk: &state.risk,
        history: &history,
        spread,
        now: Utc::now(),
    };

    let verdict = SignalEngine::evaluate(instrument, &windows, &ctx)?;
    state.record_verdict(&verdict);

    if let EngineVerdict::Emitted(signal) = &verdict {
        for sink in &state.sinks {
            if let Err(e) = sink.publish(signal).await {
                error!(instrument = %instrument, error = %e, "sink publish failed");
                state.push_error(format!("sink failed for {instrument}: {e}"));
            }
        }
    }

    Ok(())
}

/// Refit one instrument's regime model from a fresh primary-timeframe
/// window.
async fn refit_regime_model(state: &Arc<AppState>, instrument: &str) -> Result<()> {
    let config = state.config.read().clone();

    let fit_count = config
        .timeframes
        .iter()
        .find(|tf| tf.timeframe == PRIMARY_TIMEFRAME)
        .map(|tf| tf.fetch_count)
        .unwrap_or(500);

    let candles = tokio::time::timeout(
        Duration::from_secs(config.fetch_timeout_secs),
        state
            .market_data
            .fetch(instrument, PRIMARY_TIMEFRAME, fit_count),
    )
    .await
    .with_context(|| format!("fit fetch timed out for {instrument}"))??;

    let complete: Vec<_> = candles.into_iter().filter(|c| c.complete).collect();

    let classifier = state
        .classifiers
        .get(instrument)
        .with_context(|| format!("no classifier for {instrument}"))?;

    classifier.fit(&complete)?;
    info!(instrument = %instrument, candles = complete.len(), "regime model refitted");
    Ok(())
}
