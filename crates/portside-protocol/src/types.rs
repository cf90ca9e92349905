use serde::{Deserialize, Serialize};

use crate::{Money, PlayerId, TileIndex};

/// Behavior of one tile on the circular track. Closed set; the engine matches
/// it exhaustively so a new tile behavior cannot be silently ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    /// The track origin; crossing it pays the pass-start bonus.
    Start,
    /// Ownable, rentable, buildable.
    Property,
    /// Teleports the landing player to the next port around the track.
    Port,
    /// Holding tile; landing here as a visitor has no effect.
    Jail,
    /// Sends the landing player to the jail tile.
    GoToJail,
    /// Draw from the community deck.
    DrawCommunity,
    /// Draw from the chance deck.
    DrawChance,
    /// Safe landing, no effect.
    RestStop,
    /// Charges the flat tax amount unless the player is immune this round.
    Tax,
    /// The landing player sits out their next turn.
    SkipTurn,
    /// Grants tax immunity through the next round.
    Immunity,
}

impl TileKind {
    /// Whether tiles of this kind can carry an owner and constructions.
    pub fn ownable(self) -> bool {
        matches!(self, TileKind::Property)
    }
}

/// The two escalating construction levels a property can host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    One,
    Two,
}

/// The two card decks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeckKind {
    Community,
    Chance,
}

/// Machine-actionable card effect tag. The optional `param` on [`Card`]
/// carries the amount or target tile for the actions that need one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardAction {
    AddMoney,
    LoseMoney,
    MoveToTile,
    MoveToTileWithBonus,
    MoveToNearestPort,
    GoToJail,
    GrantJailReleaseToken,
}

/// One event card.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Human-readable effect text shown to the player.
    pub description: String,
    pub action: CardAction,
    /// Numeric/string parameter (amount or tile index), action-dependent.
    #[serde(default)]
    pub param: Option<String>,
}

/// Fully-resolved effect of a drawn card. Computed without mutating state;
/// the engine applies it when the player acknowledges the card.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CardEffect {
    /// Signed balance change through the ledger.
    Money { delta: Money },
    /// Relocation to a concrete tile, optionally paying the pass-start bonus.
    MoveTo { tile: TileIndex, pass_bonus: bool },
    /// Relocation to the next port after the player's position.
    NearestPort { tile: TileIndex },
    /// Straight to jail, no bonus.
    GoToJail,
    /// One-time get-out-of-jail token.
    ReleaseToken,
}

/// A drawn card waiting for the player's acknowledgement. The turn is
/// suspended until the engine receives `Command::AcknowledgeCard`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingCard {
    pub player: PlayerId,
    pub deck: DeckKind,
    pub card: Card,
    pub effect: CardEffect,
}

/// Session lifecycle. Transitions are monotonic: a finished or cancelled
/// game never becomes active again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting,
    Active,
    Finished,
    Cancelled,
}

/// Renderer-facing per-player status. Display only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerActivity {
    /// Not this player's turn.
    Waiting,
    /// Active, dice not yet resolved.
    Rolling,
    /// Active AI player deciding.
    Thinking,
    /// Active, rolled, resolving purchases/cards/rent.
    Acting,
}

/// One line of the append-only action log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub round: u32,
    pub text: String,
}

/// Entity tables a change notification can refer to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Session,
    Players,
    Tiles,
    Log,
    Achievements,
}

/// Payload-free "entity table changed" notification. Delivered at-least-once,
/// ordered per entity by `version`; receivers refetch on notify.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub game: crate::GameId,
    pub entity: EntityKind,
    pub version: u64,
}
