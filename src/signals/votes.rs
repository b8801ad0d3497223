// =============================================================================
// Indicator voting — regime-adaptive per-timeframe votes
// =============================================================================
//
// Six indicators vote per timeframe. Four are regime-independent (EMA
// ribbon, MACD, stochastic, volume); RSI and Bollinger switch behaviour by
// regime: mean-reversion thresholds in ranging markets, trend-continuation
// thresholds in trending ones. Each regime's threshold set is a
// `RegimePolicy` value so the policies are isolated, enumerable units
// instead of interleaved conditionals.
//
// The volume vote is a booster: ±0.5 applied only to whichever side is
// already strictly ahead. It can amplify a leader, never create one.

use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorSnapshot;
use crate::market_data::Timeframe;
use crate::regime::RegimeLabel;
use crate::types::Direction;

/// Volume ratio above which participation counts as confirmation.
const VOLUME_CONFIRM_RATIO: f64 = 1.2;
/// Size of the volume booster vote.
const VOLUME_BOOST: f64 = 0.5;
/// Stochastic extreme zones.
const STOCH_OVERSOLD: f64 = 20.0;
const STOCH_OVERBOUGHT: f64 = 80.0;

// =============================================================================
// Per-regime policy
// =============================================================================

/// RSI voting rule for one regime family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RsiRule {
    /// Fade the extremes: buy deep oversold, sell deep overbought.
    MeanReversion { oversold: f64, overbought: f64 },
    /// Join the trend on a pullback into the band.
    TrendPullback {
        direction: Direction,
        band_low: f64,
        band_high: f64,
    },
    /// Standard 30/70 thresholds when the regime gives no edge.
    Classic { oversold: f64, overbought: f64 },
}

impl RsiRule {
    fn vote(&self, rsi: f64) -> Option<(Direction, String)> {
        match *self {
            Self::MeanReversion { oversold, overbought } => {
                if rsi < oversold {
                    Some((Direction::Buy, format!("rsi {rsi:.1} oversold (ranging)")))
                } else if rsi > overbought {
                    Some((Direction::Sell, format!("rsi {rsi:.1} overbought (ranging)")))
                } else {
                    None
                }
            }
            Self::TrendPullback {
                direction,
                band_low,
                band_high,
            } => {
                if rsi > band_low && rsi < band_high {
                    let detail = match direction {
                        Direction::Buy => format!("rsi {rsi:.1} pullback in uptrend"),
                        Direction::Sell => format!("rsi {rsi:.1} rally in downtrend"),
                    };
                    Some((direction, detail))
                } else {
                    None
                }
            }
            Self::Classic { oversold, overbought } => {
                if rsi < oversold {
                    Some((Direction::Buy, format!("rsi {rsi:.1} oversold")))
                } else if rsi > overbought {
                    Some((Direction::Sell, format!("rsi {rsi:.1} overbought")))
                } else {
                    None
                }
            }
        }
    }
}

/// Bollinger voting rule for one regime family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BollingerRule {
    /// Fade the band extremes.
    MeanReversion { lower: f64, upper: f64 },
    /// Vote with the trend on a band breakout or a pullback toward the
    /// opposite band.
    TrendFollow {
        direction: Direction,
        pullback: f64,
    },
    /// No Bollinger opinion (transitional / unknown regimes).
    Abstain,
}

impl BollingerRule {
    fn vote(&self, position: f64, close: f64, upper: f64, lower: f64) -> Option<(Direction, String)> {
        match *self {
            Self::MeanReversion { lower: lo, upper: up } => {
                if position < lo {
                    Some((Direction::Buy, format!("bollinger position {position:.2} near lower band")))
                } else if position > up {
                    Some((Direction::Sell, format!("bollinger position {position:.2} near upper band")))
                } else {
                    None
                }
            }
            Self::TrendFollow { direction, pullback } => match direction {
                Direction::Buy => {
                    if close > upper {
                        Some((Direction::Buy, "bollinger breakout above upper band".to_string()))
                    } else if position < pullback {
                        Some((Direction::Buy, format!("bollinger pullback {position:.2} in uptrend")))
                    } else {
                        None
                    }
                }
                Direction::Sell => {
                    if close < lower {
                        Some((Direction::Sell, "bollinger breakout below lower band".to_string()))
                    } else if position > 1.0 - pullback {
                        Some((Direction::Sell, format!("bollinger rally {position:.2} in downtrend")))
                    } else {
                        None
                    }
                }
            },
            Self::Abstain => None,
        }
    }
}

/// The regime-dependent threshold set used when voting one timeframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimePolicy {
    pub rsi: RsiRule,
    pub bollinger: BollingerRule,
    /// Band multiplier for the Bollinger calculation itself: tighter in
    /// ranging regimes, wider in trending ones.
    pub bollinger_num_std: f64,
}

impl RegimePolicy {
    /// Tagged-variant dispatch: one policy per regime family.
    pub fn for_regime(label: RegimeLabel) -> Self {
        if label.is_ranging() {
            Self {
                rsi: RsiRule::MeanReversion {
                    oversold: 20.0,
                    overbought: 80.0,
                },
                bollinger: BollingerRule::MeanReversion {
                    lower: 0.2,
                    upper: 0.8,
                },
                bollinger_num_std: 1.8,
            }
        } else if label.is_trending_up() {
            Self {
                rsi: RsiRule::TrendPullback {
                    direction: Direction::Buy,
                    band_low: 30.0,
                    band_high: 50.0,
                },
                bollinger: BollingerRule::TrendFollow {
                    direction: Direction::Buy,
                    pullback: 0.3,
                },
                bollinger_num_std: 2.2,
            }
        } else if label.is_trending_down() {
            Self {
                rsi: RsiRule::TrendPullback {
                    direction: Direction::Sell,
                    band_low: 50.0,
                    band_high: 70.0,
                },
                bollinger: BollingerRule::TrendFollow {
                    direction: Direction::Sell,
                    pullback: 0.3,
                },
                bollinger_num_std: 2.2,
            }
        } else {
            // Transitional / Unknown: classic RSI only, Bollinger abstains.
            Self {
                rsi: RsiRule::Classic {
                    oversold: 30.0,
                    overbought: 70.0,
                },
                bollinger: BollingerRule::Abstain,
                bollinger_num_std: 2.0,
            }
        }
    }
}

// =============================================================================
// Per-timeframe voting
// =============================================================================

/// Vote counts for one timeframe, with the per-indicator detail trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeVotes {
    pub timeframe: Timeframe,
    pub buy: f64,
    pub sell: f64,
    pub details: Vec<String>,
}

impl TimeframeVotes {
    /// The locally leading direction, requiring a margin beyond the volume
    /// booster so a booster alone cannot flip the read.
    pub fn leader(&self) -> Option<Direction> {
        if self.buy > self.sell + VOLUME_BOOST {
            Some(Direction::Buy)
        } else if self.sell > self.buy + VOLUME_BOOST {
            Some(Direction::Sell)
        } else {
            None
        }
    }
}

/// Run all six indicator votes for one timeframe under the given regime.
///
/// Undefined snapshot fields vote neutral: they add to neither side.
pub fn vote_timeframe(
    timeframe: Timeframe,
    snapshot: &IndicatorSnapshot,
    regime: RegimeLabel,
) -> TimeframeVotes {
    let policy = RegimePolicy::for_regime(regime);

    let mut buy = 0.0;
    let mut sell = 0.0;
    let mut details = Vec::new();

    fn cast(
        vote: Option<(Direction, String)>,
        buy: &mut f64,
        sell: &mut f64,
        details: &mut Vec<String>,
    ) {
        if let Some((direction, detail)) = vote {
            match direction {
                Direction::Buy => *buy += 1.0,
                Direction::Sell => *sell += 1.0,
            }
            details.push(detail);
        }
    }

    // 1. EMA ribbon alignment.
    if let Some(ribbon) = &snapshot.ema_ribbon {
        let vote = if ribbon.is_bullish() {
            Some((Direction::Buy, "ema ribbon bullish (fast>medium>slow)".to_string()))
        } else if ribbon.is_bearish() {
            Some((Direction::Sell, "ema ribbon bearish (fast<medium<slow)".to_string()))
        } else {
            details.push("ema ribbon mixed".to_string());
            None
        };
        cast(vote, &mut buy, &mut sell, &mut details);
    }

    // 2. RSI, regime-adaptive.
    if let Some(rsi) = snapshot.rsi {
        cast(policy.rsi.vote(rsi), &mut buy, &mut sell, &mut details);
    }

    // 3. MACD histogram sign + expansion.
    if let Some(macd) = &snapshot.macd {
        let vote = if macd.is_expanding_up() {
            Some((Direction::Buy, format!("macd histogram {:.5} expanding up", macd.histogram)))
        } else if macd.is_expanding_down() {
            Some((Direction::Sell, format!("macd histogram {:.5} expanding down", macd.histogram)))
        } else {
            None
        };
        cast(vote, &mut buy, &mut sell, &mut details);
    }

    // 4. Bollinger, regime-adaptive.
    if let (Some(bands), Some(close)) = (&snapshot.bollinger, snapshot.close) {
        cast(
            policy.bollinger.vote(bands.position, close, bands.upper, bands.lower),
            &mut buy,
            &mut sell,
            &mut details,
        );
    }

    // 5. Stochastic extreme-zone crossover.
    if let Some(stoch) = &snapshot.stochastic {
        let vote = if stoch.bullish_crossover(STOCH_OVERSOLD) {
            Some((Direction::Buy, format!("stochastic oversold crossover k={:.1}", stoch.k)))
        } else if stoch.bearish_crossover(STOCH_OVERBOUGHT) {
            Some((Direction::Sell, format!("stochastic overbought crossover k={:.1}", stoch.k)))
        } else {
            None
        };
        cast(vote, &mut buy, &mut sell, &mut details);
    }

    // 6. Volume confirmation: boost only the side already strictly ahead.
    if let Some(ratio) = snapshot.volume_ratio {
        if ratio > VOLUME_CONFIRM_RATIO {
            if buy > sell {
                buy += VOLUME_BOOST;
                details.push(format!("volume {ratio:.2}x confirms buy"));
            } else if sell > buy {
                sell += VOLUME_BOOST;
                details.push(format!("volume {ratio:.2}x confirms sell"));
            } else {
                details.push(format!("volume {ratio:.2}x but no leader to confirm"));
            }
        }
    }

    TimeframeVotes {
        timeframe,
        buy,
        sell,
        details,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::bollinger::BollingerBands;
    use crate::indicators::ema::EmaRibbon;
    use crate::indicators::macd::MacdValue;
    use crate::indicators::stochastic::StochasticValue;

    /// The worked example: a strongly bullish M5 snapshot in a low-vol
    /// uptrend.
    fn bullish_snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            close: Some(1.26543),
            ema_ribbon: Some(EmaRibbon {
                fast: 1.2660,
                medium: 1.2650,
                slow: 1.2640,
            }),
            rsi: Some(42.0),
            macd: Some(MacdValue {
                macd: 0.0008,
                signal: 0.0005,
                histogram: 0.0003,
                prev_histogram: Some(0.0001),
            }),
            bollinger: Some(BollingerBands {
                upper: 1.2670,
                middle: 1.2650,
                lower: 1.2630,
                position: 0.25,
            }),
            stochastic: Some(StochasticValue {
                k: 18.0,
                d: 15.0,
                prev_k: Some(12.0),
                prev_d: Some(14.0),
            }),
            atr: Some(0.00089),
            atr_pct: Some(0.07),
            adx: Some(28.0),
            volume_ratio: Some(1.3),
        }
    }

    #[test]
    fn worked_example_scores_five_and_a_half() {
        let votes = vote_timeframe(
            Timeframe::M5,
            &bullish_snapshot(),
            RegimeLabel::TrendingUpLowVol,
        );
        assert!((votes.buy - 5.5).abs() < 1e-10, "buy votes {}", votes.buy);
        assert!(votes.sell.abs() < 1e-10);
        assert_eq!(votes.leader(), Some(Direction::Buy));
    }

    #[test]
    fn rsi_42_is_neutral_in_ranging_regime() {
        let votes = vote_timeframe(Timeframe::M5, &bullish_snapshot(), RegimeLabel::RangingLowVol);
        // In a ranging regime RSI 42 is not extreme and the trending
        // bollinger pullback no longer applies; position 0.25 is above the
        // 0.2 reversal threshold.
        assert!(votes.buy < 5.5);
    }

    #[test]
    fn empty_snapshot_votes_nothing() {
        let votes = vote_timeframe(
            Timeframe::H1,
            &IndicatorSnapshot::default(),
            RegimeLabel::TrendingUpLowVol,
        );
        assert!(votes.buy.abs() < f64::EPSILON);
        assert!(votes.sell.abs() < f64::EPSILON);
        assert_eq!(votes.leader(), None);
    }

    #[test]
    fn volume_cannot_create_a_leader() {
        let snapshot = IndicatorSnapshot {
            volume_ratio: Some(2.0),
            ..IndicatorSnapshot::default()
        };
        let votes = vote_timeframe(Timeframe::M5, &snapshot, RegimeLabel::RangingLowVol);
        assert!(votes.buy.abs() < f64::EPSILON);
        assert!(votes.sell.abs() < f64::EPSILON);
    }

    #[test]
    fn volume_amplifies_existing_leader_only() {
        let mut snapshot = bullish_snapshot();
        snapshot.volume_ratio = Some(1.1); // below the confirmation ratio
        let without = vote_timeframe(Timeframe::M5, &snapshot, RegimeLabel::TrendingUpLowVol);
        snapshot.volume_ratio = Some(1.5);
        let with = vote_timeframe(Timeframe::M5, &snapshot, RegimeLabel::TrendingUpLowVol);
        assert!((with.buy - without.buy - VOLUME_BOOST).abs() < 1e-10);
    }

    #[test]
    fn votes_bounded_by_indicator_count() {
        let votes = vote_timeframe(
            Timeframe::M5,
            &bullish_snapshot(),
            RegimeLabel::TrendingUpLowVol,
        );
        assert!(votes.buy <= 5.5);
        assert!(votes.sell <= 5.5);
    }

    #[test]
    fn bearish_mirror_snapshot() {
        let snapshot = IndicatorSnapshot {
            close: Some(1.2600),
            ema_ribbon: Some(EmaRibbon {
                fast: 1.2590,
                medium: 1.2600,
                slow: 1.2610,
            }),
            rsi: Some(60.0),
            macd: Some(MacdValue {
                macd: -0.0008,
                signal: -0.0005,
                histogram: -0.0003,
                prev_histogram: Some(-0.0001),
            }),
            bollinger: Some(BollingerBands {
                upper: 1.2650,
                middle: 1.2630,
                lower: 1.2610,
                position: 0.8,
            }),
            stochastic: Some(StochasticValue {
                k: 85.0,
                d: 88.0,
                prev_k: Some(92.0),
                prev_d: Some(90.0),
            }),
            atr: Some(0.0009),
            atr_pct: Some(0.07),
            adx: Some(30.0),
            volume_ratio: Some(1.4),
        };
        let votes = vote_timeframe(Timeframe::M5, &snapshot, RegimeLabel::TrendingDownLowVol);
        assert!((votes.sell - 5.5).abs() < 1e-10, "sell votes {}", votes.sell);
        assert!(votes.buy.abs() < 1e-10);
    }

    #[test]
    fn policy_dispatch_per_family() {
        let ranging = RegimePolicy::for_regime(RegimeLabel::RangingHighVol);
        assert!(matches!(ranging.rsi, RsiRule::MeanReversion { .. }));
        assert!((ranging.bollinger_num_std - 1.8).abs() < f64::EPSILON);

        let up = RegimePolicy::for_regime(RegimeLabel::TrendingUpHighVol);
        assert!(matches!(
            up.rsi,
            RsiRule::TrendPullback {
                direction: Direction::Buy,
                ..
            }
        ));
        assert!((up.bollinger_num_std - 2.2).abs() < f64::EPSILON);

        let unknown = RegimePolicy::for_regime(RegimeLabel::Unknown);
        assert!(matches!(unknown.rsi, RsiRule::Classic { .. }));
        assert_eq!(unknown.bollinger, BollingerRule::Abstain);
    }
}
