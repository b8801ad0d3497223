// =============================================================================
// Shared types used across the Meridian signal engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction of a trade signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Outcome of a single closed trade, as supplied by the trade-history
/// collaborator. The engine only reads these.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradeOutcome {
    /// Realised profit or loss in account currency (positive = win).
    pub pnl: f64,
    /// Amount that was risked on the trade.
    pub risked: f64,
}

impl TradeOutcome {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}

/// Trailing trade performance plus the current drawdown from peak balance.
///
/// Read-only input to the risk sizer; the engine never writes trade results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeHistory {
    /// Past trade outcomes, oldest first.
    pub outcomes: Vec<TradeOutcome>,
    /// Current drawdown as a fraction of peak balance (0.0 = at peak).
    pub drawdown: f64,
}

impl TradeHistory {
    /// A history with no trades and no drawdown.
    pub fn empty() -> Self {
        Self {
            outcomes: Vec::new(),
            drawdown: 0.0,
        }
    }

    pub fn win_count(&self) -> usize {
        self.outcomes.iter().filter(|t| t.is_win()).count()
    }

    pub fn loss_count(&self) -> usize {
        self.outcomes.len() - self.win_count()
    }
}

impl Default for TradeHistory {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_display() {
        assert_eq!(format!("{}", Direction::Buy), "BUY");
        assert_eq!(format!("{}", Direction::Sell), "SELL");
    }

    #[test]
    fn empty_history_counts() {
        let h = TradeHistory::empty();
        assert_eq!(h.win_count(), 0);
        assert_eq!(h.loss_count(), 0);
        assert!((h.drawdown - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn win_loss_counting() {
        let h = TradeHistory {
            outcomes: vec![
                TradeOutcome { pnl: 10.0, risked: 5.0 },
                TradeOutcome { pnl: -5.0, risked: 5.0 },
                TradeOutcome { pnl: 0.0, risked: 5.0 },
            ],
            drawdown: 0.02,
        };
        // Zero PnL counts as a loss (no win).
        assert_eq!(h.win_count(), 1);
        assert_eq!(h.loss_count(), 2);
    }
}
