// =============================================================================
// Market Data Module
// =============================================================================
//
// Candle windows for the signal engine:
// - OHLCV candle and timeframe definitions
// - Bounded per-(instrument, timeframe) candle windows
// - Concurrent multi-timeframe fetching with an explicit timeout

pub mod fetch;
pub mod series;

pub use fetch::fetch_timeframes;
pub use series::{Candle, SeriesKey, Timeframe, TimeframeSeries};
