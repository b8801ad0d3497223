// =============================================================================
// Candle series — bounded per-(instrument, timeframe) windows
// =============================================================================
//
// A `TimeframeSeries` is an ordered, insertion-order-significant rolling
// window of completed candles for one (instrument, timeframe) pair. The
// window is owned by the caller of the engine; every pipeline stage only
// reads a `&[Candle]` view of it.

use serde::{Deserialize, Serialize};

/// A single OHLCV candle. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    /// Candle open time, milliseconds since the UNIX epoch.
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Whether the provider reported this candle as complete.
    pub complete: bool,
}

/// The timeframes evaluated by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M5,
    M15,
    H1,
}

impl Timeframe {
    /// Provider granularity code for the candle endpoint.
    pub fn granularity(self) -> &'static str {
        match self {
            Self::M5 => "M5",
            Self::M15 => "M15",
            Self::H1 => "H1",
        }
    }

    /// Length of one candle in minutes.
    pub fn minutes(self) -> u32 {
        match self {
            Self::M5 => 5,
            Self::M15 => 15,
            Self::H1 => 60,
        }
    }

    pub fn all() -> [Timeframe; 3] {
        [Self::M5, Self::M15, Self::H1]
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.granularity())
    }
}

/// Composite key that identifies a unique candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SeriesKey {
    pub instrument: String,
    pub timeframe: Timeframe,
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.instrument, self.timeframe)
    }
}

/// Bounded rolling window of completed candles, oldest first.
///
/// Incomplete candles are rejected at insertion so that every indicator
/// reads settled prices only. When the window exceeds `max_len` the oldest
/// candles are discarded.
#[derive(Debug, Clone)]
pub struct TimeframeSeries {
    key: SeriesKey,
    candles: Vec<Candle>,
    max_len: usize,
}

impl TimeframeSeries {
    pub fn new(key: SeriesKey, max_len: usize) -> Self {
        Self {
            key,
            candles: Vec::with_capacity(max_len),
            max_len,
        }
    }

    /// Build a series from a fetched batch, keeping only complete candles
    /// and at most the `max_len` most recent ones.
    pub fn from_candles(key: SeriesKey, candles: Vec<Candle>, max_len: usize) -> Self {
        let mut series = Self::new(key, max_len);
        for candle in candles {
            series.push(candle);
        }
        series
    }

    /// Append a completed candle, trimming the front to stay within budget.
    /// Incomplete candles are ignored.
    pub fn push(&mut self, candle: Candle) {
        if !candle.complete {
            return;
        }
        self.candles.push(candle);
        if self.candles.len() > self.max_len {
            let excess = self.candles.len() - self.max_len;
            self.candles.drain(..excess);
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    /// Read-only view of the window, oldest first.
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open_time: i64, close: f64, complete: bool) -> Candle {
        Candle {
            open_time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
            complete,
        }
    }

    fn key() -> SeriesKey {
        SeriesKey {
            instrument: "GBP_USD".into(),
            timeframe: Timeframe::M5,
        }
    }

    #[test]
    fn window_trims_oldest() {
        let mut series = TimeframeSeries::new(key(), 3);
        for i in 0..5 {
            series.push(candle(i * 300_000, 100.0 + i as f64, true));
        }
        assert_eq!(series.len(), 3);
        assert_eq!(series.closes(), vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn incomplete_candles_rejected() {
        let mut series = TimeframeSeries::new(key(), 10);
        series.push(candle(0, 100.0, true));
        series.push(candle(300_000, 101.0, false));
        assert_eq!(series.len(), 1);
        assert_eq!(series.last_close(), Some(100.0));
    }

    #[test]
    fn from_candles_filters_and_trims() {
        let batch = vec![
            candle(0, 1.0, true),
            candle(1, 2.0, false),
            candle(2, 3.0, true),
            candle(3, 4.0, true),
        ];
        let series = TimeframeSeries::from_candles(key(), batch, 2);
        assert_eq!(series.closes(), vec![3.0, 4.0]);
    }

    #[test]
    fn series_key_display() {
        assert_eq!(format!("{}", key()), "GBP_USD@M5");
    }

    #[test]
    fn timeframe_minutes() {
        assert_eq!(Timeframe::M5.minutes(), 5);
        assert_eq!(Timeframe::M15.minutes(), 15);
        assert_eq!(Timeframe::H1.minutes(), 60);
    }
}
