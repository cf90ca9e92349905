mod achievements;
mod ai;
mod board;
mod cards;
mod engine;
mod ledger;
mod rng;
pub mod selfplay;

pub use crate::achievements::{
    default_catalog, observations_from_events, AchievementDef, AchievementRecord, ConditionKind,
    MetricObservation, ObserveCtx, Tracker, Unlock,
};
pub use crate::ai::{
    build_probability, purchase_probability, run_ai_turn, wants_to_build, wants_to_buy, AiProfile,
    PURCHASE_RESERVE, TIER1_RESERVE, TIER2_RESERVE,
};
pub use crate::board::{load_board, Board, BoardError, BoardSource, TileDef};
pub use crate::cards::{
    load_decks, parse_card_amount, resolve, Deck, DeckError, DeckSource, Decks,
    CARD_GAIN_FALLBACK, CARD_LOSS_FALLBACK,
};
pub use crate::engine::{
    GameConfig, GameEngine, GameState, Player, PlayerSpec, RuleError, SetupError, MAX_PLAYERS,
};
pub use crate::ledger::{
    apply as apply_transactions, rent_for, BalanceChange, Transaction, TIER1_RENT_STEP,
    TIER2_RENT_STEP,
};
pub use crate::rng::GameRng;
pub use crate::selfplay::{
    run_selfplay, GameMetrics, LocalGame, SelfPlayConfig, SelfPlayError, SelfPlayResult,
};
