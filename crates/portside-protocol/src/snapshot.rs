use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{GameOutcome, GameStatus, LogEntry, Money, PendingCard, PlayerId, TileIndex};

/// Full game state for initial sync, rejoin, or refetch-on-notify.
///
/// Static board/deck definitions are game configuration and are not carried
/// here; both sides compile them from the same source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: GameStatus,
    pub round: u32,
    pub current_player: PlayerId,
    pub players: Vec<PlayerSnapshot>,
    /// Mutable tile state, index-aligned with the board definition.
    pub tiles: Vec<TileState>,
    #[serde(default)]
    pub pending_card: Option<PendingCard>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
    /// Tiles whose rent the active player has already paid this turn.
    #[serde(default)]
    pub rent_paid: Vec<TileIndex>,
    /// Set once the game is finished.
    #[serde(default)]
    pub outcome: Option<GameOutcome>,
    pub rng_state: [u8; 32], // for determinism verification and resync
}

/// Mutable per-tile state. Non-property tiles never carry an owner or
/// construction counts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TileState {
    #[serde(default)]
    pub owner: Option<PlayerId>,
    #[serde(default)]
    pub tier1: u8,
    #[serde(default)]
    pub tier2: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub is_ai: bool,
    pub position: TileIndex,
    pub balance: Money,
    #[serde(default)]
    pub owned_tiles: Vec<TileIndex>,
    /// Landings per owned tile; gates construction eligibility.
    #[serde(default)]
    pub visits: BTreeMap<TileIndex, u32>,
    #[serde(default)]
    pub in_jail: bool,
    #[serde(default)]
    pub jail_turns_served: u8,
    #[serde(default)]
    pub skip_next_turn: bool,
    #[serde(default)]
    pub immune_until_round: Option<u32>,
    #[serde(default)]
    pub consecutive_doubles: u8,
    #[serde(default)]
    pub release_token: bool,
    #[serde(default)]
    pub has_rolled: bool,
}
