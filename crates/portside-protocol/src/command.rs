use serde::{Deserialize, Serialize};

use crate::{Tier, TileIndex};

/// All possible player→engine commands. Fully serializable.
///
/// Every command acts on behalf of the submitting player; the engine rejects
/// any command from a player who does not own the active turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Resolve the dice for this turn: movement, jail handling, tile effects.
    Roll,
    /// Apply the pending drawn card and resume the suspended turn.
    AcknowledgeCard,
    /// Buy an unowned property tile at its listed price.
    BuyTile { tile: TileIndex },
    /// Add one construction of the given tier on an owned property.
    Build { tile: TileIndex, tier: Tier },
    /// Pay rent on another player's tile (once per tile per turn).
    PayRent { tile: TileIndex },
    /// Finish the turn and advance turn ownership.
    EndTurn,
}
