//! Economy ledger: batched balance application and rent derivation.
//!
//! Balances never go negative at this boundary: each transaction is clamped
//! to the player's available funds. The clamp mirrors legacy behavior and is
//! flagged in DESIGN.md as worth revisiting; callers that must not overdraw
//! (purchases, construction) check funds before transacting.

use portside_protocol::{Money, PlayerId, TileState};

use crate::board::TileDef;
use crate::engine::Player;

/// Rent added per tier-1 construction unit.
pub const TIER1_RENT_STEP: Money = 50;
/// Rent added per tier-2 construction unit.
pub const TIER2_RENT_STEP: Money = 25;

/// One signed balance change request.
#[derive(Clone, Debug)]
pub struct Transaction {
    pub player: PlayerId,
    pub amount: Money,
    pub reason: String,
}

impl Transaction {
    pub fn new(player: PlayerId, amount: Money, reason: impl Into<String>) -> Self {
        Self {
            player,
            amount,
            reason: reason.into(),
        }
    }
}

/// What actually happened to one balance. `applied` differs from `requested`
/// when the non-negative clamp cut a debit short.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceChange {
    pub player: PlayerId,
    pub requested: Money,
    pub applied: Money,
    pub balance: Money,
    pub reason: String,
}

/// Apply a batch of transactions as one visible state transition.
///
/// There are no cross-player dependencies, so the batch reduces to
/// independent clamped additions; presenting it as a unit keeps observers and
/// the log seeing a single transition.
pub fn apply(players: &mut [Player], batch: &[Transaction]) -> Vec<BalanceChange> {
    let mut changes = Vec::with_capacity(batch.len());
    for tx in batch {
        let player = &mut players[tx.player.index()];
        let before = player.balance;
        let after = (before + tx.amount).max(0);
        player.balance = after;
        changes.push(BalanceChange {
            player: tx.player,
            requested: tx.amount,
            applied: after - before,
            balance: after,
            reason: tx.reason.clone(),
        });
    }
    changes
}

/// Nominal rent for a tile: base plus a fixed step per construction unit.
pub fn rent_for(def: &TileDef, state: &TileState) -> Money {
    def.base_rent
        + TIER1_RENT_STEP * Money::from(state.tier1)
        + TIER2_RENT_STEP * Money::from(state.tier2)
}
