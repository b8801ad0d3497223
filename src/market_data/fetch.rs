// =============================================================================
// Multi-timeframe fetch — concurrent window retrieval with a hard timeout
// =============================================================================
//
// All timeframes for one instrument are independent reads against the
// provider, so they are issued concurrently. A timeout or provider failure
// on ANY timeframe fails the whole fetch; the caller treats that as
// "skip this instrument's cycle" and sibling instruments are unaffected.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::future::join_all;
use tracing::debug;

use crate::market_data::{SeriesKey, Timeframe, TimeframeSeries};
use crate::providers::MarketDataProvider;
use crate::runtime_config::TimeframeSettings;

/// Fetch the configured candle window for every timeframe of `instrument`.
///
/// Returns a map with one entry per configured timeframe, or the first
/// error encountered (timeout included). A series that comes back shorter
/// than requested is NOT an error here — downstream indicators degrade to
/// undefined fields on short windows.
pub async fn fetch_timeframes(
    provider: &Arc<dyn MarketDataProvider>,
    instrument: &str,
    settings: &[TimeframeSettings],
    timeout: Duration,
) -> Result<HashMap<Timeframe, TimeframeSeries>> {
    let futures = settings.iter().map(|tf| {
        let provider = provider.clone();
        let instrument = instrument.to_string();
        let timeframe = tf.timeframe;
        let count = tf.fetch_count;
        async move {
            let candles = tokio::time::timeout(
                timeout,
                provider.fetch(&instrument, timeframe, count),
            )
            .await
            .with_context(|| format!("fetch timed out for {instrument}@{timeframe}"))?
            .with_context(|| format!("fetch failed for {instrument}@{timeframe}"))?;

            let key = SeriesKey {
                instrument,
                timeframe,
            };
            Ok::<_, anyhow::Error>(TimeframeSeries::from_candles(key, candles, count))
        }
    });

    let results = join_all(futures).await;

    let mut windows = HashMap::with_capacity(settings.len());
    for result in results {
        let series = result?;
        debug!(key = %series.key(), candles = series.len(), "timeframe window fetched");
        windows.insert(series.key().timeframe, series);
    }

    Ok(windows)
}
