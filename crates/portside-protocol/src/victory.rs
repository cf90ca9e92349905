//! Win conditions and final-result reporting.

use serde::{Deserialize, Serialize};

use crate::{Money, PlayerId};

/// Why the game ended. Checked in this order after every completed turn;
/// the first satisfied condition short-circuits the rest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinReason {
    /// Every other player is bankrupt.
    LastStanding,
    /// Reached the configured tier-1 construction goal.
    ConstructionGoal,
    /// Highest balance when the round limit was reached.
    RichestAtLimit,
}

impl std::fmt::Display for WinReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            WinReason::LastStanding => "last standing",
            WinReason::ConstructionGoal => "construction goal",
            WinReason::RichestAtLimit => "richest at limit",
        };
        f.write_str(text)
    }
}

/// Result of a completed game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameOutcome {
    pub winner: PlayerId,
    pub reason: WinReason,
    /// Round the game ended on.
    pub round: u32,
    /// Final balances in turn order.
    pub balances: Vec<(PlayerId, Money)>,
}
