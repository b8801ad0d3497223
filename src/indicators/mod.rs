// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators consumed by the
// voting engine. Every public function returns `Option<T>` (or an empty
// series) so callers are forced to handle insufficient-history and
// numerical-edge-case scenarios — an undefined indicator votes neutral, it
// never aborts a cycle.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod snapshot;
pub mod stochastic;
pub mod volume;

pub use snapshot::{compute_snapshot, IndicatorParams, IndicatorSnapshot};
