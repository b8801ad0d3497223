// =============================================================================
// Vote aggregation — weighted cross-timeframe totals and the decision rule
// =============================================================================
//
// Per-timeframe vote counts are combined into one global score using fixed
// per-timeframe weights that sum to exactly 1.0 (validated when the engine
// configuration is constructed). The decision rule:
//
//   a side wins only if its weighted total reaches `min_votes_required`
//   AND strictly exceeds the opposing side; anything else is NO_ACTION,
//   with the raw tallies retained for diagnostics.
//
// Strength is the winning weighted total as a share of the maximum
// possible votes, reported as a percentage.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::market_data::Timeframe;
use crate::signals::votes::TimeframeVotes;
use crate::types::Direction;

/// Maximum votes one timeframe can produce: five directional indicators
/// plus the 0.5 volume booster, normalised against the indicator count.
pub const MAX_POSSIBLE_VOTES: f64 = 6.0;

/// Per-timeframe votes plus the globally weighted totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteTally {
    pub timeframes: Vec<TimeframeVotes>,
    pub weighted_buy: f64,
    pub weighted_sell: f64,
    /// Share of timeframes agreeing with the most common local read.
    pub agreement: f64,
}

/// Outcome of the decision rule over a tally.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Decision {
    /// `None` means NO_ACTION.
    pub direction: Option<Direction>,
    /// Winning (or best losing) weighted votes as a percentage of
    /// [`MAX_POSSIBLE_VOTES`].
    pub strength: f64,
}

/// Combine per-timeframe votes using the configured weights.
///
/// Weights are assumed validated (sum to 1.0, one entry per timeframe); a
/// timeframe missing from the map contributes nothing.
pub fn aggregate(timeframes: Vec<TimeframeVotes>, weights: &HashMap<Timeframe, f64>) -> VoteTally {
    let mut weighted_buy = 0.0;
    let mut weighted_sell = 0.0;

    for votes in &timeframes {
        let weight = weights.get(&votes.timeframe).copied().unwrap_or(0.0);
        weighted_buy += votes.buy * weight;
        weighted_sell += votes.sell * weight;
    }

    let agreement = timeframe_agreement(&timeframes);

    VoteTally {
        timeframes,
        weighted_buy,
        weighted_sell,
        agreement,
    }
}

/// Apply the decision rule to a tally.
pub fn decide(tally: &VoteTally, min_votes_required: f64) -> Decision {
    let buy = tally.weighted_buy;
    let sell = tally.weighted_sell;

    if buy >= min_votes_required && buy > sell {
        Decision {
            direction: Some(Direction::Buy),
            strength: strength_of(buy),
        }
    } else if sell >= min_votes_required && sell > buy {
        Decision {
            direction: Some(Direction::Sell),
            strength: strength_of(sell),
        }
    } else {
        // No action — still report the best side's strength for diagnostics.
        Decision {
            direction: None,
            strength: strength_of(buy.max(sell)),
        }
    }
}

fn strength_of(votes: f64) -> f64 {
    (votes / MAX_POSSIBLE_VOTES) * 100.0
}

/// How aligned the timeframes are: the share held by the most common local
/// read (buy / sell / neutral).
fn timeframe_agreement(timeframes: &[TimeframeVotes]) -> f64 {
    if timeframes.is_empty() {
        return 0.0;
    }

    let mut buys = 0usize;
    let mut sells = 0usize;
    let mut neutral = 0usize;
    for votes in timeframes {
        match votes.leader() {
            Some(Direction::Buy) => buys += 1,
            Some(Direction::Sell) => sells += 1,
            None => neutral += 1,
        }
    }

    buys.max(sells).max(neutral) as f64 / timeframes.len() as f64
}
