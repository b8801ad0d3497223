// =============================================================================
// Indicator Snapshot — one timeframe's technical picture at the latest bar
// =============================================================================
//
// Every field is independently optional: a window too short for one
// indicator leaves that field `None` while the others still compute. An
// undefined field votes neutral downstream; it never fails the cycle.

use serde::{Deserialize, Serialize};

use crate::indicators::atr::{atr_pct, wilder_atr};
use crate::indicators::adx::wilder_adx;
use crate::indicators::bollinger::{bollinger, BollingerBands};
use crate::indicators::ema::{ema_ribbon, EmaRibbon};
use crate::indicators::macd::{macd, MacdValue};
use crate::indicators::rsi::wilder_rsi;
use crate::indicators::stochastic::{fast_stochastic, StochasticValue};
use crate::indicators::volume::volume_ratio;
use crate::market_data::Candle;

/// Look-back windows for every indicator in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub ema_fast: usize,
    pub ema_medium: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    /// Band multiplier; the engine overrides this per regime (tighter in
    /// ranging markets, wider in trending ones).
    pub bollinger_num_std: f64,
    pub stochastic_k: usize,
    pub stochastic_d: usize,
    pub atr_period: usize,
    pub adx_period: usize,
    pub volume_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ema_fast: 5,
            ema_medium: 8,
            ema_slow: 13,
            rsi_period: 7,
            macd_fast: 6,
            macd_slow: 13,
            macd_signal: 4,
            bollinger_period: 14,
            bollinger_num_std: 2.0,
            stochastic_k: 5,
            stochastic_d: 3,
            atr_period: 14,
            adx_period: 14,
            volume_period: 20,
        }
    }
}

impl IndicatorParams {
    /// The longest look-back any indicator in the snapshot needs. Windows
    /// shorter than this will have at least one undefined field.
    pub fn longest_lookback(&self) -> usize {
        (2 * self.adx_period + 1)
            .max(self.atr_period + 1)
            .max(self.volume_period)
            .max(self.bollinger_period)
            .max(self.macd_slow + self.macd_signal)
            .max(self.ema_slow)
            .max(self.rsi_period + 1)
            .max(self.stochastic_k + self.stochastic_d)
    }

    /// Copy of these params with a different Bollinger band multiplier.
    pub fn with_bollinger_std(&self, num_std: f64) -> Self {
        Self {
            bollinger_num_std: num_std,
            ..self.clone()
        }
    }
}

/// Computed technical values for one timeframe at its latest candle.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSnapshot {
    pub close: Option<f64>,
    pub ema_ribbon: Option<EmaRibbon>,
    pub rsi: Option<f64>,
    pub macd: Option<MacdValue>,
    pub bollinger: Option<BollingerBands>,
    pub stochastic: Option<StochasticValue>,
    pub atr: Option<f64>,
    pub atr_pct: Option<f64>,
    pub adx: Option<f64>,
    pub volume_ratio: Option<f64>,
}

/// Compute the full snapshot for one candle window.
///
/// Pure function of the window: no state is retained between calls. A short
/// window produces a snapshot with undefined fields rather than an error.
pub fn compute_snapshot(candles: &[Candle], params: &IndicatorParams) -> IndicatorSnapshot {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    IndicatorSnapshot {
        close: closes.last().copied(),
        ema_ribbon: ema_ribbon(&closes, params.ema_fast, params.ema_medium, params.ema_slow),
        rsi: wilder_rsi(&closes, params.rsi_period),
        macd: macd(&closes, params.macd_fast, params.macd_slow, params.macd_signal),
        bollinger: bollinger(&closes, params.bollinger_period, params.bollinger_num_std),
        stochastic: fast_stochastic(candles, params.stochastic_k, params.stochastic_d),
        atr: wilder_atr(candles, params.atr_period),
        atr_pct: atr_pct(candles, params.atr_period),
        adx: wilder_adx(candles, params.adx_period),
        volume_ratio: volume_ratio(candles, params.volume_period),
    }
}
