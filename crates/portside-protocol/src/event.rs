use serde::{Deserialize, Serialize};

use crate::{Card, CardEffect, DeckKind, GameOutcome, LogEntry, Money, PlayerId, Tier, TileIndex};

/// How a player ended up in jail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JailCause {
    ThreeDoubles,
    Tile,
    Card,
}

/// How a jailed player got out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JailRelease {
    /// Served the full jail term.
    ServedTerm,
    /// Passed the release roll.
    LuckyRoll,
    /// Spent the one-time release token.
    Token,
}

/// All possible engine→observer events. Fully serializable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // Turn flow
    DiceRolled {
        player: PlayerId,
        first: u8,
        second: u8,
        doubles: bool,
    },
    TurnStarted {
        player: PlayerId,
        round: u32,
    },
    TurnEnded {
        player: PlayerId,
    },
    /// A skip-next-turn flag was consumed during turn advance.
    TurnSkipped {
        player: PlayerId,
    },
    RoundAdvanced {
        round: u32,
    },
    GameEnded {
        outcome: GameOutcome,
    },

    // Movement
    PlayerMoved {
        player: PlayerId,
        from: TileIndex,
        to: TileIndex,
    },
    PassedStart {
        player: PlayerId,
        bonus: Money,
    },
    PortTeleport {
        player: PlayerId,
        from: TileIndex,
        to: TileIndex,
    },

    // Jail
    SentToJail {
        player: PlayerId,
        cause: JailCause,
    },
    StayedInJail {
        player: PlayerId,
        turns_served: u8,
    },
    ReleasedFromJail {
        player: PlayerId,
        how: JailRelease,
    },

    // Economy. `delta` is the effective change after the ledger's
    // non-negative clamp, so observers see what actually moved.
    BalanceChanged {
        player: PlayerId,
        delta: Money,
        balance: Money,
        reason: String,
    },
    TilePurchased {
        player: PlayerId,
        tile: TileIndex,
        price: Money,
    },
    ConstructionBuilt {
        player: PlayerId,
        tile: TileIndex,
        tier: Tier,
        count: u8,
    },
    RentPaid {
        payer: PlayerId,
        owner: PlayerId,
        tile: TileIndex,
        amount: Money,
    },
    TaxCharged {
        player: PlayerId,
        amount: Money,
    },
    TaxWaived {
        player: PlayerId,
    },

    // Special tiles
    TurnSkipFlagged {
        player: PlayerId,
    },
    ImmunityGranted {
        player: PlayerId,
        until_round: u32,
    },

    // Cards
    CardDrawn {
        player: PlayerId,
        deck: DeckKind,
        card: Card,
    },
    CardAcknowledged {
        player: PlayerId,
        effect: CardEffect,
    },
    ReleaseTokenGranted {
        player: PlayerId,
    },

    // Log
    LogAppended {
        entry: LogEntry,
    },
}
