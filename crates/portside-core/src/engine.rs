//! The turn state machine.
//!
//! All mutation flows through [`GameEngine::apply_command_checked`]; there is
//! no other write path. The engine is deterministic (one injected RNG, state
//! carried in snapshots), `Clone` so a coordinator can validate a command on
//! a scratch copy and commit atomically, and unaware of whether it is driven
//! in-process or behind a session layer.

use std::collections::{BTreeMap, BTreeSet};

use portside_protocol::{
    Command, Event, GameOutcome, GameStatus, JailCause, JailRelease, LogEntry, Money, PendingCard,
    PlayerId, PlayerSnapshot, Snapshot, Tier, TileIndex, TileKind, TileState, WinReason,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::{load_board, Board, BoardError, BoardSource};
use crate::cards::{load_decks, resolve, DeckError, DeckSource, Decks};
use crate::ledger::{self, Transaction};
use crate::rng::GameRng;

pub const MAX_PLAYERS: usize = 8;

/// Game-rule tunables. Board and decks are separate configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Starting balance for every player.
    pub initial_balance: Money,
    /// Bonus for completing a circuit of the track.
    pub pass_start_bonus: Money,
    /// Flat charge on tax tiles.
    pub tax_amount: Money,
    /// Failed release attempts before an unconditional release.
    pub jail_term: u8,
    /// Probability of the per-turn jail release roll.
    pub jail_release_chance: f32,
    /// Consecutive doubles that send a player to jail.
    pub doubles_to_jail: u8,
    /// Round count that triggers the richest-wins check.
    pub round_limit: u32,
    /// Total tier-1 constructions that win outright.
    pub construction_goal: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            initial_balance: 1500,
            pass_start_bonus: 200,
            tax_amount: 100,
            jail_term: 3,
            jail_release_chance: 1.0 / 6.0,
            doubles_to_jail: 3,
            round_limit: 20,
            construction_goal: 10,
        }
    }
}

/// Fatal configuration problems at game start.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Decks(#[from] DeckError),
    #[error("a game needs at least two players")]
    NotEnoughPlayers,
    #[error("too many players (max {MAX_PLAYERS})")]
    TooManyPlayers,
    #[error("the board has no jail tile")]
    NoJailTile,
    #[error("snapshot does not match this board (tiles {snapshot} vs {board})")]
    TileCountMismatch { snapshot: usize, board: usize },
}

/// Expected rule violations. Recoverable; the engine mutates nothing when
/// returning one of these. Surfacing a message is the calling layer's job.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("game is not active")]
    NotActive,
    #[error("unknown player")]
    UnknownPlayer,
    #[error("not this player's turn")]
    NotYourTurn,
    #[error("dice already rolled this turn")]
    AlreadyRolled,
    #[error("a roll is already in flight")]
    RollInFlight,
    #[error("a drawn card is awaiting acknowledgement")]
    CardPending,
    #[error("no card is awaiting acknowledgement")]
    NoCardPending,
    #[error("dice have not been rolled yet")]
    HasNotRolled,
    #[error("no such tile")]
    NoSuchTile,
    #[error("tile cannot be owned")]
    NotAProperty,
    #[error("tile is already owned")]
    AlreadyOwned,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("player does not own this tile")]
    NotYourTile,
    #[error("not enough visits on this tile to build")]
    NotEnoughVisits,
    #[error("tier-2 construction needs a tier-1 building first")]
    MissingTier1,
    #[error("tile is unowned")]
    Unowned,
    #[error("cannot pay rent on an owned tile of one's own")]
    OwnTile,
    #[error("rent for this tile was already paid this turn")]
    RentAlreadyPaid,
}

/// Visits required before tier-1 construction (prevents building on the turn
/// of purchase).
const TIER1_VISITS_REQUIRED: u32 = 3;
const TIER2_VISITS_REQUIRED: u32 = 1;

/// One player at the table.
#[derive(Clone, Debug)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub is_ai: bool,
    pub position: TileIndex,
    pub balance: Money,
    pub owned: BTreeSet<TileIndex>,
    pub visits: BTreeMap<TileIndex, u32>,
    pub in_jail: bool,
    pub jail_turns_served: u8,
    pub skip_next_turn: bool,
    pub immune_until_round: Option<u32>,
    pub consecutive_doubles: u8,
    pub release_token: bool,
    pub has_rolled: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: String, is_ai: bool, balance: Money) -> Self {
        Self {
            id,
            name,
            is_ai,
            position: 0,
            balance,
            owned: BTreeSet::new(),
            visits: BTreeMap::new(),
            in_jail: false,
            jail_turns_served: 0,
            skip_next_turn: false,
            immune_until_round: None,
            consecutive_doubles: 0,
            release_token: false,
            has_rolled: false,
        }
    }

    pub fn visits_on(&self, tile: TileIndex) -> u32 {
        self.visits.get(&tile).copied().unwrap_or(0)
    }

    fn to_snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            name: self.name.clone(),
            is_ai: self.is_ai,
            position: self.position,
            balance: self.balance,
            owned_tiles: self.owned.iter().copied().collect(),
            visits: self.visits.clone(),
            in_jail: self.in_jail,
            jail_turns_served: self.jail_turns_served,
            skip_next_turn: self.skip_next_turn,
            immune_until_round: self.immune_until_round,
            consecutive_doubles: self.consecutive_doubles,
            release_token: self.release_token,
            has_rolled: self.has_rolled,
        }
    }

    fn from_snapshot(snap: &PlayerSnapshot) -> Self {
        Self {
            id: snap.id,
            name: snap.name.clone(),
            is_ai: snap.is_ai,
            position: snap.position,
            balance: snap.balance,
            owned: snap.owned_tiles.iter().copied().collect(),
            visits: snap.visits.clone(),
            in_jail: snap.in_jail,
            jail_turns_served: snap.jail_turns_served,
            skip_next_turn: snap.skip_next_turn,
            immune_until_round: snap.immune_until_round,
            consecutive_doubles: snap.consecutive_doubles,
            release_token: snap.release_token,
            has_rolled: snap.has_rolled,
        }
    }
}

/// Player roster entry for game creation.
#[derive(Clone, Debug)]
pub struct PlayerSpec {
    pub name: String,
    pub is_ai: bool,
}

impl PlayerSpec {
    pub fn human(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_ai: false,
        }
    }

    pub fn ai(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_ai: true,
        }
    }
}

/// Full game state. Only the engine mutates it.
#[derive(Clone, Debug)]
pub struct GameState {
    config: GameConfig,
    board: Board,
    decks: Decks,
    rng: GameRng,
    status: GameStatus,
    round: u32,
    current_player: PlayerId,
    players: Vec<Player>,
    tiles: Vec<TileState>,
    pending_card: Option<PendingCard>,
    /// Tiles whose rent the active player already paid this turn.
    rent_paid: BTreeSet<TileIndex>,
    log: Vec<LogEntry>,
    next_log_id: u64,
    outcome: Option<GameOutcome>,
}

impl GameState {
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn decks(&self) -> &Decks {
        &self.decks
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn current_player(&self) -> PlayerId {
        self.current_player
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> &Player {
        &self.players[id.index()]
    }

    pub fn tiles(&self) -> &[TileState] {
        &self.tiles
    }

    pub fn tile_state(&self, index: TileIndex) -> &TileState {
        &self.tiles[index]
    }

    pub fn pending_card(&self) -> Option<&PendingCard> {
        self.pending_card.as_ref()
    }

    pub fn rent_already_paid(&self, tile: TileIndex) -> bool {
        self.rent_paid.contains(&tile)
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn outcome(&self) -> Option<&GameOutcome> {
        self.outcome.as_ref()
    }
}

#[derive(Clone, Debug)]
#[allow(dead_code)]
struct RecordedCommand {
    round: u32,
    player: PlayerId,
    command: Command,
}

/// The rules engine: one instance per game.
#[derive(Clone, Debug)]
pub struct GameEngine {
    state: GameState,
    command_log: Vec<RecordedCommand>,
}

impl GameEngine {
    /// New game on the embedded board and decks.
    pub fn new_game(
        config: GameConfig,
        specs: &[PlayerSpec],
        seed: u64,
    ) -> Result<Self, SetupError> {
        let board = load_board(BoardSource::Embedded)?;
        let decks = load_decks(DeckSource::Embedded, &board)?;
        Self::new_game_with_rules(config, board, decks, specs, seed)
    }

    pub fn new_game_with_rules(
        config: GameConfig,
        board: Board,
        decks: Decks,
        specs: &[PlayerSpec],
        seed: u64,
    ) -> Result<Self, SetupError> {
        if specs.len() < 2 {
            return Err(SetupError::NotEnoughPlayers);
        }
        if specs.len() > MAX_PLAYERS {
            return Err(SetupError::TooManyPlayers);
        }
        if board.jail_index().is_none() {
            return Err(SetupError::NoJailTile);
        }

        let players = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                Player::new(
                    PlayerId(i as u8),
                    spec.name.clone(),
                    spec.is_ai,
                    config.initial_balance,
                )
            })
            .collect();
        let tiles = vec![TileState::default(); board.len()];

        Ok(Self {
            state: GameState {
                config,
                board,
                decks,
                rng: GameRng::seed_from_u64(seed),
                status: GameStatus::Active,
                round: 1,
                current_player: PlayerId(0),
                players,
                tiles,
                pending_card: None,
                rent_paid: BTreeSet::new(),
                log: Vec::new(),
                next_log_id: 0,
                outcome: None,
            },
            command_log: Vec::new(),
        })
    }

    /// Rebuild an engine from an authoritative snapshot (resync/reconnect).
    /// Board, decks and config are static per game and supplied by the caller.
    pub fn from_snapshot(
        config: GameConfig,
        board: Board,
        decks: Decks,
        snapshot: &Snapshot,
    ) -> Result<Self, SetupError> {
        if snapshot.tiles.len() != board.len() {
            return Err(SetupError::TileCountMismatch {
                snapshot: snapshot.tiles.len(),
                board: board.len(),
            });
        }
        if board.jail_index().is_none() {
            return Err(SetupError::NoJailTile);
        }

        let next_log_id = snapshot.log.iter().map(|e| e.id + 1).max().unwrap_or(0);
        Ok(Self {
            state: GameState {
                config,
                board,
                decks,
                rng: GameRng::from_state_bytes(snapshot.rng_state),
                status: snapshot.status,
                round: snapshot.round,
                current_player: snapshot.current_player,
                players: snapshot.players.iter().map(Player::from_snapshot).collect(),
                tiles: snapshot.tiles.clone(),
                pending_card: snapshot.pending_card.clone(),
                rent_paid: snapshot.rent_paid.iter().copied().collect(),
                log: snapshot.log.clone(),
                next_log_id,
                outcome: snapshot.outcome.clone(),
            },
            command_log: Vec::new(),
        })
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn snapshot(&self) -> Snapshot {
        let s = &self.state;
        Snapshot {
            status: s.status,
            round: s.round,
            current_player: s.current_player,
            players: s.players.iter().map(Player::to_snapshot).collect(),
            tiles: s.tiles.clone(),
            pending_card: s.pending_card.clone(),
            log: s.log.clone(),
            rent_paid: s.rent_paid.iter().copied().collect(),
            outcome: s.outcome.clone(),
            rng_state: s.rng.state_bytes(),
        }
    }

    /// Cancel a game that has not finished. Monotonic: a finished game stays
    /// finished.
    pub fn cancel(&mut self) {
        if self.state.status == GameStatus::Active || self.state.status == GameStatus::Waiting {
            self.state.status = GameStatus::Cancelled;
        }
    }

    /// Validate and apply one command for `player`.
    ///
    /// Expected rule violations come back as `Err(RuleError)` with no state
    /// change; the error is the discriminated failure result, not an
    /// exception path.
    pub fn apply_command_checked(
        &mut self,
        player: PlayerId,
        command: Command,
    ) -> Result<Vec<Event>, RuleError> {
        if self.state.status != GameStatus::Active {
            return Err(RuleError::NotActive);
        }
        if player.index() >= self.state.players.len() {
            return Err(RuleError::UnknownPlayer);
        }
        if player != self.state.current_player {
            return Err(RuleError::NotYourTurn);
        }

        let events = match command {
            Command::Roll => self.roll(player)?,
            Command::AcknowledgeCard => self.acknowledge_card(player)?,
            Command::BuyTile { tile } => self.buy_tile(player, tile)?,
            Command::Build { tile, tier } => self.build(player, tile, tier)?,
            Command::PayRent { tile } => self.pay_rent(player, tile)?,
            Command::EndTurn => self.end_turn(player)?,
        };
        self.command_log.push(RecordedCommand {
            round: self.state.round,
            player,
            command,
        });
        Ok(events)
    }

    // ------------------------------------------------------------------
    // Turn state machine
    // ------------------------------------------------------------------

    fn roll(&mut self, pid: PlayerId) -> Result<Vec<Event>, RuleError> {
        let idx = pid.index();
        if self.state.players[idx].has_rolled {
            return Err(RuleError::AlreadyRolled);
        }
        if self.state.pending_card.is_some() {
            return Err(RuleError::CardPending);
        }

        let mut events = Vec::new();
        let name = self.state.players[idx].name.clone();

        let first = self.state.rng.roll_die();
        let second = self.state.rng.roll_die();
        let doubles = first == second;
        events.push(Event::DiceRolled {
            player: pid,
            first,
            second,
            doubles,
        });
        self.push_log(&mut events, format!("{name} rolls {first} and {second}."));
        self.state.players[idx].has_rolled = true;

        // Jail resolution. The one path where a roll produces no movement is
        // a failed release: the served counter increments and the turn is
        // over bar the EndTurn call.
        let mut released_this_turn = false;
        if self.state.players[idx].in_jail {
            let release = if self.state.players[idx].jail_turns_served >= self.state.config.jail_term
            {
                Some(JailRelease::ServedTerm)
            } else if self.state.rng.chance(self.state.config.jail_release_chance) {
                Some(JailRelease::LuckyRoll)
            } else if self.state.players[idx].release_token {
                self.state.players[idx].release_token = false;
                Some(JailRelease::Token)
            } else {
                None
            };

            match release {
                Some(how) => {
                    self.state.players[idx].in_jail = false;
                    self.state.players[idx].jail_turns_served = 0;
                    released_this_turn = true;
                    events.push(Event::ReleasedFromJail { player: pid, how });
                    let how_text = match how {
                        JailRelease::ServedTerm => "after serving the term",
                        JailRelease::LuckyRoll => "on a lucky roll",
                        JailRelease::Token => "with a release token",
                    };
                    self.push_log(
                        &mut events,
                        format!("{name} is released from jail {how_text}."),
                    );
                }
                None => {
                    self.state.players[idx].jail_turns_served += 1;
                    let served = self.state.players[idx].jail_turns_served;
                    events.push(Event::StayedInJail {
                        player: pid,
                        turns_served: served,
                    });
                    self.push_log(
                        &mut events,
                        format!("{name} stays in jail ({served} served)."),
                    );
                    return Ok(events);
                }
            }
        }

        // Consecutive doubles override the movement entirely.
        if doubles {
            self.state.players[idx].consecutive_doubles += 1;
            if self.state.players[idx].consecutive_doubles >= self.state.config.doubles_to_jail {
                self.send_to_jail(&mut events, pid, JailCause::ThreeDoubles);
                return Ok(events);
            }
        } else {
            self.state.players[idx].consecutive_doubles = 0;
        }

        // Movement with pass-start bonus.
        let total = usize::from(first + second);
        let track = self.state.board.len();
        let old = self.state.players[idx].position;
        let new = (old + total) % track;
        self.state.players[idx].position = new;
        events.push(Event::PlayerMoved {
            player: pid,
            from: old,
            to: new,
        });
        let landed = self.state.board.tile(new).name.clone();
        self.push_log(&mut events, format!("{name} moves {total} tiles to {landed}."));
        if old + total >= track && !released_this_turn {
            let changes = self.apply_transactions(
                &mut events,
                &[Transaction::new(
                    pid,
                    self.state.config.pass_start_bonus,
                    "pass-start bonus",
                )],
            );
            events.push(Event::PassedStart {
                player: pid,
                bonus: changes[0].applied,
            });
            self.push_log(&mut events, format!("{name} collects the pass-start bonus."));
        }

        self.apply_tile_effects(&mut events, pid);

        // Visit bookkeeping at the final position gates construction.
        let landing = self.state.players[idx].position;
        self.record_visit(pid, landing);

        Ok(events)
    }

    fn apply_tile_effects(&mut self, events: &mut Vec<Event>, pid: PlayerId) {
        let idx = pid.index();
        let position = self.state.players[idx].position;
        let name = self.state.players[idx].name.clone();
        let kind = self.state.board.tile(position).kind;

        match kind {
            // Safe landings.
            TileKind::Start | TileKind::RestStop | TileKind::Jail => {}
            // Rent and purchase are player decisions, not automatic effects.
            TileKind::Property => {}
            TileKind::GoToJail => {
                self.send_to_jail(events, pid, JailCause::Tile);
            }
            TileKind::SkipTurn => {
                self.state.players[idx].skip_next_turn = true;
                events.push(Event::TurnSkipFlagged { player: pid });
                self.push_log(events, format!("{name} will sit out the next turn."));
            }
            TileKind::Immunity => {
                let until = self.state.round + 1;
                self.state.players[idx].immune_until_round = Some(until);
                events.push(Event::ImmunityGranted {
                    player: pid,
                    until_round: until,
                });
                self.push_log(
                    events,
                    format!("{name} holds a free-port charter through round {until}."),
                );
            }
            TileKind::Tax => {
                let immune = self.state.players[idx]
                    .immune_until_round
                    .is_some_and(|r| r >= self.state.round);
                if immune {
                    events.push(Event::TaxWaived { player: pid });
                    self.push_log(events, format!("{name}'s charter waives the harbor dues."));
                } else {
                    let changes = self.apply_transactions(
                        events,
                        &[Transaction::new(
                            pid,
                            -self.state.config.tax_amount,
                            "harbor dues",
                        )],
                    );
                    let paid = -changes[0].applied;
                    events.push(Event::TaxCharged {
                        player: pid,
                        amount: paid,
                    });
                    self.push_log(events, format!("{name} pays {paid} in harbor dues."));
                }
            }
            TileKind::Port => {
                // One immediate relocation, never chained.
                if let Some(target) = self.state.board.next_port_after(position) {
                    self.state.players[idx].position = target;
                    events.push(Event::PortTeleport {
                        player: pid,
                        from: position,
                        to: target,
                    });
                    let from_name = self.state.board.tile(position).name.clone();
                    let to_name = self.state.board.tile(target).name.clone();
                    self.push_log(
                        events,
                        format!("{name} is ferried from {from_name} to {to_name}."),
                    );
                }
            }
            TileKind::DrawCommunity | TileKind::DrawChance => {
                let deck_kind = if kind == TileKind::DrawCommunity {
                    portside_protocol::DeckKind::Community
                } else {
                    portside_protocol::DeckKind::Chance
                };
                let card = self
                    .state
                    .decks
                    .deck(deck_kind)
                    .draw(&mut self.state.rng)
                    .clone();
                let effect = resolve(&card, position, &self.state.board);
                events.push(Event::CardDrawn {
                    player: pid,
                    deck: deck_kind,
                    card: card.clone(),
                });
                self.push_log(
                    events,
                    format!("{name} draws a card: {}", card.description),
                );
                // The turn suspends until the player acknowledges.
                self.state.pending_card = Some(PendingCard {
                    player: pid,
                    deck: deck_kind,
                    card,
                    effect,
                });
            }
        }
    }

    fn acknowledge_card(&mut self, pid: PlayerId) -> Result<Vec<Event>, RuleError> {
        let pending = self.state.pending_card.take().ok_or(RuleError::NoCardPending)?;
        let idx = pid.index();
        let name = self.state.players[idx].name.clone();

        let mut events = vec![Event::CardAcknowledged {
            player: pid,
            effect: pending.effect.clone(),
        }];

        match pending.effect {
            portside_protocol::CardEffect::Money { delta } => {
                let changes = self.apply_transactions(
                    &mut events,
                    &[Transaction::new(pid, delta, "card")],
                );
                let applied = changes[0].applied;
                let text = if applied >= 0 {
                    format!("{name} collects {applied} from the card.")
                } else {
                    format!("{name} pays {} for the card.", -applied)
                };
                self.push_log(&mut events, text);
            }
            portside_protocol::CardEffect::MoveTo { tile, pass_bonus } => {
                if pass_bonus {
                    let changes = self.apply_transactions(
                        &mut events,
                        &[Transaction::new(
                            pid,
                            self.state.config.pass_start_bonus,
                            "pass-start bonus",
                        )],
                    );
                    events.push(Event::PassedStart {
                        player: pid,
                        bonus: changes[0].applied,
                    });
                    self.push_log(&mut events, format!("{name} collects the pass-start bonus."));
                }
                let from = self.state.players[idx].position;
                self.state.players[idx].position = tile;
                events.push(Event::PlayerMoved {
                    player: pid,
                    from,
                    to: tile,
                });
                let to_name = self.state.board.tile(tile).name.clone();
                self.push_log(&mut events, format!("{name} is moved to {to_name}."));
                self.record_visit(pid, tile);
            }
            portside_protocol::CardEffect::NearestPort { tile } => {
                let from = self.state.players[idx].position;
                self.state.players[idx].position = tile;
                events.push(Event::PortTeleport {
                    player: pid,
                    from,
                    to: tile,
                });
                let to_name = self.state.board.tile(tile).name.clone();
                self.push_log(&mut events, format!("{name} sails to {to_name}."));
            }
            portside_protocol::CardEffect::GoToJail => {
                self.send_to_jail(&mut events, pid, JailCause::Card);
            }
            portside_protocol::CardEffect::ReleaseToken => {
                self.state.players[idx].release_token = true;
                events.push(Event::ReleaseTokenGranted { player: pid });
                self.push_log(&mut events, format!("{name} receives a release token."));
            }
        }

        Ok(events)
    }

    fn end_turn(&mut self, pid: PlayerId) -> Result<Vec<Event>, RuleError> {
        if !self.state.players[pid.index()].has_rolled {
            return Err(RuleError::HasNotRolled);
        }
        if self.state.pending_card.is_some() {
            return Err(RuleError::CardPending);
        }

        let mut events = Vec::new();
        let name = self.state.players[pid.index()].name.clone();
        events.push(Event::TurnEnded { player: pid });
        self.push_log(&mut events, format!("{name} ends the turn."));

        let count = self.state.players.len();
        let mut idx = self.state.current_player.index();
        self.advance_index(&mut events, &mut idx, count);

        // Consume chained skip flags, all in this call.
        while self.state.players[idx].skip_next_turn {
            self.state.players[idx].skip_next_turn = false;
            let skipped = PlayerId(idx as u8);
            let skipped_name = self.state.players[idx].name.clone();
            events.push(Event::TurnSkipped { player: skipped });
            self.push_log(&mut events, format!("{skipped_name} sits out this turn."));
            self.advance_index(&mut events, &mut idx, count);
        }

        self.state.current_player = PlayerId(idx as u8);
        for player in &mut self.state.players {
            player.has_rolled = false;
        }
        self.state.rent_paid.clear();

        let next_name = self.state.players[idx].name.clone();
        events.push(Event::TurnStarted {
            player: self.state.current_player,
            round: self.state.round,
        });
        self.push_log(&mut events, format!("It is {next_name}'s turn."));

        if let Some(outcome) = self.evaluate_win() {
            self.state.status = GameStatus::Finished;
            self.state.outcome = Some(outcome.clone());
            let winner_name = self.state.players[outcome.winner.index()].name.clone();
            let reason = outcome.reason;
            events.push(Event::GameEnded { outcome });
            self.push_log(&mut events, format!("{winner_name} wins: {reason}."));
        }

        Ok(events)
    }

    fn advance_index(&mut self, events: &mut Vec<Event>, idx: &mut usize, count: usize) {
        *idx = (*idx + 1) % count;
        if *idx == 0 {
            self.state.round += 1;
            let round = self.state.round;
            events.push(Event::RoundAdvanced { round });
            self.push_log(events, format!("Round {round} begins."));
        }
    }

    // ------------------------------------------------------------------
    // Property operations
    // ------------------------------------------------------------------

    fn buy_tile(&mut self, pid: PlayerId, tile: TileIndex) -> Result<Vec<Event>, RuleError> {
        if tile >= self.state.board.len() {
            return Err(RuleError::NoSuchTile);
        }
        let def = self.state.board.tile(tile);
        if !def.kind.ownable() {
            return Err(RuleError::NotAProperty);
        }
        if self.state.tiles[tile].owner.is_some() {
            return Err(RuleError::AlreadyOwned);
        }
        let price = def.price;
        if self.state.players[pid.index()].balance < price {
            return Err(RuleError::InsufficientFunds);
        }

        let mut events = Vec::new();
        let name = self.state.players[pid.index()].name.clone();
        let tile_name = def.name.clone();

        self.apply_transactions(
            &mut events,
            &[Transaction::new(pid, -price, "purchase")],
        );
        self.state.tiles[tile].owner = Some(pid);
        self.state.players[pid.index()].owned.insert(tile);
        events.push(Event::TilePurchased {
            player: pid,
            tile,
            price,
        });
        self.push_log(&mut events, format!("{name} buys {tile_name} for {price}."));

        Ok(events)
    }

    fn build(&mut self, pid: PlayerId, tile: TileIndex, tier: Tier) -> Result<Vec<Event>, RuleError> {
        if tile >= self.state.board.len() {
            return Err(RuleError::NoSuchTile);
        }
        let def = self.state.board.tile(tile);
        if !def.kind.ownable() {
            return Err(RuleError::NotAProperty);
        }
        if self.state.tiles[tile].owner != Some(pid) {
            return Err(RuleError::NotYourTile);
        }
        let cost = def.cost_of(tier);
        if self.state.players[pid.index()].balance < cost {
            return Err(RuleError::InsufficientFunds);
        }
        let visits = self.state.players[pid.index()].visits_on(tile);
        let required = match tier {
            Tier::One => TIER1_VISITS_REQUIRED,
            Tier::Two => TIER2_VISITS_REQUIRED,
        };
        if visits < required {
            return Err(RuleError::NotEnoughVisits);
        }
        if tier == Tier::Two && self.state.tiles[tile].tier1 == 0 {
            return Err(RuleError::MissingTier1);
        }

        let mut events = Vec::new();
        let name = self.state.players[pid.index()].name.clone();
        let tile_name = def.name.clone();

        self.apply_transactions(&mut events, &[Transaction::new(pid, -cost, "construction")]);
        let count = match tier {
            Tier::One => {
                self.state.tiles[tile].tier1 += 1;
                self.state.tiles[tile].tier1
            }
            Tier::Two => {
                self.state.tiles[tile].tier2 += 1;
                self.state.tiles[tile].tier2
            }
        };
        events.push(Event::ConstructionBuilt {
            player: pid,
            tile,
            tier,
            count,
        });
        let tier_text = match tier {
            Tier::One => "tier-one",
            Tier::Two => "tier-two",
        };
        self.push_log(
            &mut events,
            format!("{name} adds a {tier_text} building on {tile_name}."),
        );

        Ok(events)
    }

    fn pay_rent(&mut self, pid: PlayerId, tile: TileIndex) -> Result<Vec<Event>, RuleError> {
        if tile >= self.state.board.len() {
            return Err(RuleError::NoSuchTile);
        }
        let owner = self.state.tiles[tile].owner.ok_or(RuleError::Unowned)?;
        if owner == pid {
            return Err(RuleError::OwnTile);
        }
        if self.state.rent_paid.contains(&tile) {
            return Err(RuleError::RentAlreadyPaid);
        }

        let def = self.state.board.tile(tile);
        let rent = ledger::rent_for(def, &self.state.tiles[tile]);
        // The payment clamps to the payer's funds; both sides see the amount
        // that actually moved.
        let amount = rent.min(self.state.players[pid.index()].balance);

        let mut events = Vec::new();
        let name = self.state.players[pid.index()].name.clone();
        let owner_name = self.state.players[owner.index()].name.clone();
        let tile_name = def.name.clone();

        self.apply_transactions(
            &mut events,
            &[
                Transaction::new(pid, -amount, "rent"),
                Transaction::new(owner, amount, "rent income"),
            ],
        );
        self.state.rent_paid.insert(tile);
        events.push(Event::RentPaid {
            payer: pid,
            owner,
            tile,
            amount,
        });
        self.push_log(
            &mut events,
            format!("{name} pays {amount} rent to {owner_name} for {tile_name}."),
        );

        Ok(events)
    }

    // ------------------------------------------------------------------
    // Win evaluation
    // ------------------------------------------------------------------

    /// Checked after every completed turn; first satisfied condition wins.
    fn evaluate_win(&self) -> Option<GameOutcome> {
        let balances: Vec<(PlayerId, Money)> = self
            .state
            .players
            .iter()
            .map(|p| (p.id, p.balance))
            .collect();

        // (a) Bankruptcy: last player standing.
        let solvent: Vec<PlayerId> = self
            .state
            .players
            .iter()
            .filter(|p| p.balance > 0)
            .map(|p| p.id)
            .collect();
        if solvent.len() == 1 {
            return Some(GameOutcome {
                winner: solvent[0],
                reason: WinReason::LastStanding,
                round: self.state.round,
                balances,
            });
        }

        // (b) Construction goal.
        for player in &self.state.players {
            let tier1_total: u32 = player
                .owned
                .iter()
                .map(|&t| u32::from(self.state.tiles[t].tier1))
                .sum();
            if tier1_total >= self.state.config.construction_goal {
                return Some(GameOutcome {
                    winner: player.id,
                    reason: WinReason::ConstructionGoal,
                    round: self.state.round,
                    balances,
                });
            }
        }

        // (c) Round limit: richest wins, earliest seat breaking ties.
        if self.state.round >= self.state.config.round_limit {
            let richest = self
                .state
                .players
                .iter()
                .fold(None::<&Player>, |best, p| match best {
                    Some(b) if b.balance >= p.balance => Some(b),
                    _ => Some(p),
                })?;
            return Some(GameOutcome {
                winner: richest.id,
                reason: WinReason::RichestAtLimit,
                round: self.state.round,
                balances,
            });
        }

        None
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    fn send_to_jail(&mut self, events: &mut Vec<Event>, pid: PlayerId, cause: JailCause) {
        let jail = self
            .state
            .board
            .jail_index()
            .expect("board validated to have a jail tile");
        let idx = pid.index();
        let name = self.state.players[idx].name.clone();
        self.state.players[idx].position = jail;
        self.state.players[idx].in_jail = true;
        self.state.players[idx].consecutive_doubles = 0;
        events.push(Event::SentToJail { player: pid, cause });
        let text = match cause {
            JailCause::ThreeDoubles => {
                format!("{name} is sent to jail after three straight doubles.")
            }
            JailCause::Tile | JailCause::Card => format!("{name} is sent to jail."),
        };
        self.push_log(events, text);
    }

    fn record_visit(&mut self, pid: PlayerId, tile: TileIndex) {
        if self.state.tiles[tile].owner == Some(pid) {
            *self.state.players[pid.index()].visits.entry(tile).or_insert(0) += 1;
        }
    }

    fn apply_transactions(
        &mut self,
        events: &mut Vec<Event>,
        batch: &[Transaction],
    ) -> Vec<ledger::BalanceChange> {
        let changes = ledger::apply(&mut self.state.players, batch);
        for change in &changes {
            events.push(Event::BalanceChanged {
                player: change.player,
                delta: change.applied,
                balance: change.balance,
                reason: change.reason.clone(),
            });
        }
        changes
    }

    fn push_log(&mut self, events: &mut Vec<Event>, text: String) {
        let entry = LogEntry {
            id: self.state.next_log_id,
            round: self.state.round,
            text,
        };
        self.state.next_log_id += 1;
        self.state.log.push(entry.clone());
        events.push(Event::LogAppended { entry });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::load_board;
    use crate::cards::load_decks;

    /// A track without draw/tax/port/go-to-jail tiles: rolls resolve without
    /// suspending or redirecting, whatever the dice say.
    const CALM_BOARD: &[u8] = br#"
tiles:
  - name: Start
    kind: start
  - name: Jail
    kind: jail
  - name: Quay Lane
    kind: property
    price: 60
    base_rent: 6
    tier1_cost: 50
    tier2_cost: 50
  - name: Walk 3
    kind: rest_stop
  - name: Saltworks
    kind: property
    price: 100
    base_rent: 10
    tier1_cost: 60
    tier2_cost: 60
  - name: Walk 5
    kind: rest_stop
  - name: Walk 6
    kind: rest_stop
  - name: Walk 7
    kind: rest_stop
  - name: Walk 8
    kind: rest_stop
  - name: Walk 9
    kind: rest_stop
  - name: Walk 10
    kind: rest_stop
  - name: Walk 11
    kind: rest_stop
  - name: Walk 12
    kind: rest_stop
  - name: Walk 13
    kind: rest_stop
  - name: Walk 14
    kind: rest_stop
  - name: Walk 15
    kind: rest_stop
"#;

    /// Every tile reachable from Start in one roll is a community draw.
    const DRAW_BOARD: &[u8] = br#"
tiles:
  - name: Start
    kind: start
  - name: Jail
    kind: jail
  - name: Draw 2
    kind: draw_community
  - name: Draw 3
    kind: draw_community
  - name: Draw 4
    kind: draw_community
  - name: Draw 5
    kind: draw_community
  - name: Draw 6
    kind: draw_community
  - name: Draw 7
    kind: draw_community
  - name: Draw 8
    kind: draw_community
  - name: Draw 9
    kind: draw_community
  - name: Draw 10
    kind: draw_community
  - name: Draw 11
    kind: draw_community
  - name: Draw 12
    kind: draw_community
  - name: Walk 13
    kind: rest_stop
"#;

    const FIXED_DECK: &[u8] = br#"
community:
  - description: "Festival payout. Collect 25."
    action: add_money
    param: "25"
chance:
  - description: "Windfall."
    action: add_money
"#;

    /// Every tile reachable from Start in one roll is a port.
    const PORT_BOARD: &[u8] = br#"
tiles:
  - name: Start
    kind: start
  - name: Jail
    kind: jail
  - name: Pier 2
    kind: port
  - name: Pier 3
    kind: port
  - name: Pier 4
    kind: port
  - name: Pier 5
    kind: port
  - name: Pier 6
    kind: port
  - name: Pier 7
    kind: port
  - name: Pier 8
    kind: port
  - name: Pier 9
    kind: port
  - name: Pier 10
    kind: port
  - name: Pier 11
    kind: port
  - name: Pier 12
    kind: port
  - name: Pier 13
    kind: port
  - name: Walk 14
    kind: rest_stop
"#;

    fn engine_on(board_yaml: &[u8], players: usize, seed: u64) -> GameEngine {
        let board = load_board(BoardSource::Bytes(board_yaml)).unwrap();
        let decks = load_decks(DeckSource::Bytes(FIXED_DECK), &board).unwrap();
        let specs: Vec<PlayerSpec> = ["Alice", "Bob", "Carol", "Dan"]
            .iter()
            .take(players)
            .map(|n| PlayerSpec::human(*n))
            .collect();
        GameEngine::new_game_with_rules(GameConfig::default(), board, decks, &specs, seed).unwrap()
    }

    fn calm_engine(players: usize, seed: u64) -> GameEngine {
        engine_on(CALM_BOARD, players, seed)
    }

    #[test]
    fn roll_is_rejected_when_already_rolled() {
        let mut engine = calm_engine(2, 1);
        engine
            .apply_command_checked(PlayerId(0), Command::Roll)
            .unwrap();
        let before = engine.snapshot();
        let err = engine
            .apply_command_checked(PlayerId(0), Command::Roll)
            .unwrap_err();
        assert_eq!(err, RuleError::AlreadyRolled);
        // Rejection is a no-op: nothing changed, not even the RNG.
        assert_eq!(engine.snapshot(), before);
    }

    #[test]
    fn roll_is_rejected_for_non_active_player() {
        let mut engine = calm_engine(2, 1);
        let err = engine
            .apply_command_checked(PlayerId(1), Command::Roll)
            .unwrap_err();
        assert_eq!(err, RuleError::NotYourTurn);
    }

    #[test]
    fn end_turn_requires_a_roll() {
        let mut engine = calm_engine(2, 1);
        let err = engine
            .apply_command_checked(PlayerId(0), Command::EndTurn)
            .unwrap_err();
        assert_eq!(err, RuleError::HasNotRolled);
    }

    #[test]
    fn three_consecutive_doubles_always_jail() {
        let mut tested = 0;
        for seed in 0..200 {
            let mut engine = calm_engine(2, seed);
            engine.state.players[0].consecutive_doubles = 2;
            let events = engine
                .apply_command_checked(PlayerId(0), Command::Roll)
                .unwrap();
            let doubles = events.iter().any(
                |e| matches!(e, Event::DiceRolled { doubles, .. } if *doubles),
            );
            if !doubles {
                continue;
            }
            let player = &engine.state.players[0];
            assert!(player.in_jail);
            assert_eq!(player.consecutive_doubles, 0);
            assert_eq!(player.position, 1); // jail tile
            assert!(events
                .iter()
                .any(|e| matches!(e, Event::SentToJail { cause, .. } if *cause == JailCause::ThreeDoubles)));
            // The redirect overrides movement entirely.
            assert!(!events.iter().any(|e| matches!(e, Event::PlayerMoved { .. })));
            tested += 1;
            if tested >= 5 {
                break;
            }
        }
        assert!(tested > 0, "no doubles roll found across seeds");
    }

    #[test]
    fn jail_stay_produces_no_movement_and_ends_the_roll() {
        let mut stays = 0;
        let mut releases = 0;
        for seed in 0..200 {
            let mut engine = calm_engine(2, seed);
            engine.state.players[0].in_jail = true;
            engine.state.players[0].position = 1;
            let events = engine
                .apply_command_checked(PlayerId(0), Command::Roll)
                .unwrap();
            let stayed = events
                .iter()
                .any(|e| matches!(e, Event::StayedInJail { .. }));
            if stayed {
                stays += 1;
                let player = &engine.state.players[0];
                assert!(player.in_jail);
                assert_eq!(player.jail_turns_served, 1);
                assert_eq!(player.position, 1);
                assert!(!events.iter().any(|e| matches!(e, Event::PlayerMoved { .. })));
                assert!(player.has_rolled);
                // The turn can be ended right away.
                engine
                    .apply_command_checked(PlayerId(0), Command::EndTurn)
                    .unwrap();
            } else {
                releases += 1;
                assert!(!engine.state.players[0].in_jail);
                // A player jailed this turn gets no pass-start bonus.
                assert!(!events.iter().any(|e| matches!(e, Event::PassedStart { .. })));
            }
            if stays >= 5 && releases >= 1 {
                break;
            }
        }
        assert!(stays > 0, "no failed release across seeds");
        assert!(releases > 0, "no lucky release across seeds");
    }

    #[test]
    fn jail_term_releases_unconditionally() {
        let mut engine = calm_engine(2, 3);
        engine.state.players[0].in_jail = true;
        engine.state.players[0].position = 1;
        engine.state.players[0].jail_turns_served = 3;
        let events = engine
            .apply_command_checked(PlayerId(0), Command::Roll)
            .unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::ReleasedFromJail {
                how: JailRelease::ServedTerm,
                ..
            }
        )));
        assert!(!engine.state.players[0].in_jail);
    }

    #[test]
    fn release_token_is_consumed_only_on_failed_luck() {
        let mut consumed = 0;
        let mut kept = 0;
        for seed in 0..300 {
            let mut engine = calm_engine(2, seed);
            engine.state.players[0].in_jail = true;
            engine.state.players[0].position = 1;
            engine.state.players[0].release_token = true;
            let events = engine
                .apply_command_checked(PlayerId(0), Command::Roll)
                .unwrap();
            // With a token in hand the player always gets out.
            assert!(!engine.state.players[0].in_jail);
            assert!(!events.iter().any(|e| matches!(e, Event::StayedInJail { .. })));
            let by_token = events.iter().any(|e| {
                matches!(
                    e,
                    Event::ReleasedFromJail {
                        how: JailRelease::Token,
                        ..
                    }
                )
            });
            if by_token {
                assert!(!engine.state.players[0].release_token);
                consumed += 1;
            } else {
                assert!(engine.state.players[0].release_token);
                kept += 1;
            }
            if consumed >= 3 && kept >= 1 {
                break;
            }
        }
        assert!(consumed > 0, "token never consumed across seeds");
        assert!(kept > 0, "luck never preserved the token across seeds");
    }

    #[test]
    fn passing_start_pays_the_bonus() {
        let mut engine = calm_engine(2, 11);
        engine.state.players[0].position = engine.state.board.len() - 1;
        let before = engine.state.players[0].balance;
        let events = engine
            .apply_command_checked(PlayerId(0), Command::Roll)
            .unwrap();
        // Any total of 2..=12 from the last tile crosses start; the calm
        // board has no other balance effects.
        assert!(events.iter().any(|e| matches!(e, Event::PassedStart { .. })));
        assert_eq!(
            engine.state.players[0].balance,
            before + engine.state.config.pass_start_bonus
        );
    }

    #[test]
    fn port_landing_teleports_once() {
        let mut engine = engine_on(PORT_BOARD, 2, 21);
        let events = engine
            .apply_command_checked(PlayerId(0), Command::Roll)
            .unwrap();
        let teleports: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::PortTeleport { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect();
        assert_eq!(teleports.len(), 1, "exactly one teleport per landing");
        let (from, to) = teleports[0];
        assert_ne!(from, to);
        // Lands on the next port in track order and stays there.
        assert_eq!(to, from + 1);
        assert_eq!(engine.state.players[0].position, to);
    }

    #[test]
    fn drawn_card_suspends_the_turn_until_acknowledged() {
        let mut engine = engine_on(DRAW_BOARD, 2, 31);
        let events = engine
            .apply_command_checked(PlayerId(0), Command::Roll)
            .unwrap();
        assert!(events.iter().any(|e| matches!(e, Event::CardDrawn { .. })));
        assert!(engine.state.pending_card.is_some());

        // Rolling again and ending the turn are both blocked.
        assert_eq!(
            engine
                .apply_command_checked(PlayerId(0), Command::EndTurn)
                .unwrap_err(),
            RuleError::CardPending
        );

        let before = engine.state.players[0].balance;
        let events = engine
            .apply_command_checked(PlayerId(0), Command::AcknowledgeCard)
            .unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::CardAcknowledged { .. })));
        assert_eq!(engine.state.players[0].balance, before + 25);
        assert!(engine.state.pending_card.is_none());

        // The identical end-turn call now succeeds.
        engine
            .apply_command_checked(PlayerId(0), Command::EndTurn)
            .unwrap();
        assert_eq!(engine.state.current_player, PlayerId(1));
    }

    #[test]
    fn chained_skips_consume_in_one_end_turn() {
        let mut engine = calm_engine(4, 41);
        engine.state.players[1].skip_next_turn = true;
        engine.state.players[2].skip_next_turn = true;
        engine
            .apply_command_checked(PlayerId(0), Command::Roll)
            .unwrap();
        let events = engine
            .apply_command_checked(PlayerId(0), Command::EndTurn)
            .unwrap();
        assert_eq!(engine.state.current_player, PlayerId(3));
        assert!(!engine.state.players[1].skip_next_turn);
        assert!(!engine.state.players[2].skip_next_turn);
        let skipped: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::TurnSkipped { player } => Some(*player),
                _ => None,
            })
            .collect();
        assert_eq!(skipped, vec![PlayerId(1), PlayerId(2)]);
    }

    #[test]
    fn round_advances_when_ownership_wraps() {
        let mut engine = calm_engine(2, 51);
        assert_eq!(engine.state.round, 1);
        for expected_round in [1, 2] {
            for pid in [PlayerId(0), PlayerId(1)] {
                assert_eq!(engine.state.round, expected_round);
                engine.apply_command_checked(pid, Command::Roll).unwrap();
                engine.apply_command_checked(pid, Command::EndTurn).unwrap();
            }
        }
        assert_eq!(engine.state.round, 3);
    }

    #[test]
    fn buy_build_gating() {
        let mut engine = calm_engine(2, 61);
        // Alice buys Quay Lane (tile 2) directly.
        let before = engine.state.players[0].balance;
        engine
            .apply_command_checked(PlayerId(0), Command::BuyTile { tile: 2 })
            .unwrap();
        assert_eq!(engine.state.players[0].balance, before - 60);
        assert_eq!(engine.state.tiles[2].owner, Some(PlayerId(0)));
        assert!(engine.state.players[0].owned.contains(&2));

        // Can't buy twice, can't buy a rest stop, can't buy broke.
        assert_eq!(
            engine
                .apply_command_checked(PlayerId(0), Command::BuyTile { tile: 2 })
                .unwrap_err(),
            RuleError::AlreadyOwned
        );
        assert_eq!(
            engine
                .apply_command_checked(PlayerId(0), Command::BuyTile { tile: 3 })
                .unwrap_err(),
            RuleError::NotAProperty
        );
        engine.state.players[0].balance = 10;
        assert_eq!(
            engine
                .apply_command_checked(PlayerId(0), Command::BuyTile { tile: 4 })
                .unwrap_err(),
            RuleError::InsufficientFunds
        );
        engine.state.players[0].balance = 1000;

        // Construction is visit-gated: tier-1 needs three landings.
        assert_eq!(
            engine
                .apply_command_checked(
                    PlayerId(0),
                    Command::Build {
                        tile: 2,
                        tier: Tier::One
                    }
                )
                .unwrap_err(),
            RuleError::NotEnoughVisits
        );
        engine.state.players[0].visits.insert(2, 3);
        engine
            .apply_command_checked(
                PlayerId(0),
                Command::Build {
                    tile: 2,
                    tier: Tier::One,
                },
            )
            .unwrap();
        assert_eq!(engine.state.tiles[2].tier1, 1);

        // Tier-2 needs a tier-1 building; tile 4 has none.
        engine
            .apply_command_checked(PlayerId(0), Command::BuyTile { tile: 4 })
            .unwrap();
        engine.state.players[0].visits.insert(4, 1);
        assert_eq!(
            engine
                .apply_command_checked(
                    PlayerId(0),
                    Command::Build {
                        tile: 4,
                        tier: Tier::Two
                    }
                )
                .unwrap_err(),
            RuleError::MissingTier1
        );
        engine
            .apply_command_checked(
                PlayerId(0),
                Command::Build {
                    tile: 2,
                    tier: Tier::Two,
                },
            )
            .unwrap();
        assert_eq!(engine.state.tiles[2].tier2, 1);

        // Building on someone else's tile fails.
        engine.state.tiles[4].owner = Some(PlayerId(1));
        assert_eq!(
            engine
                .apply_command_checked(
                    PlayerId(0),
                    Command::Build {
                        tile: 4,
                        tier: Tier::One
                    }
                )
                .unwrap_err(),
            RuleError::NotYourTile
        );
    }

    #[test]
    fn rent_clamps_to_payer_balance_and_charges_once() {
        let mut engine = calm_engine(2, 71);
        engine.state.tiles[4].owner = Some(PlayerId(1));
        engine.state.tiles[4].tier1 = 2; // rent = 10 + 100 = 110
        engine.state.players[1].owned.insert(4);
        engine.state.players[0].balance = 30;
        let owner_before = engine.state.players[1].balance;

        let events = engine
            .apply_command_checked(PlayerId(0), Command::PayRent { tile: 4 })
            .unwrap();
        assert_eq!(engine.state.players[0].balance, 0);
        assert_eq!(engine.state.players[1].balance, owner_before + 30);
        assert!(events.iter().any(
            |e| matches!(e, Event::RentPaid { amount, .. } if *amount == 30)
        ));

        // Repeated UI interaction cannot double-charge.
        assert_eq!(
            engine
                .apply_command_checked(PlayerId(0), Command::PayRent { tile: 4 })
                .unwrap_err(),
            RuleError::RentAlreadyPaid
        );

        // Unowned and own-tile rent are invalid.
        assert_eq!(
            engine
                .apply_command_checked(PlayerId(0), Command::PayRent { tile: 2 })
                .unwrap_err(),
            RuleError::Unowned
        );
        engine.state.tiles[2].owner = Some(PlayerId(0));
        assert_eq!(
            engine
                .apply_command_checked(PlayerId(0), Command::PayRent { tile: 2 })
                .unwrap_err(),
            RuleError::OwnTile
        );
    }

    #[test]
    fn rent_paid_set_resets_on_end_turn() {
        let mut engine = calm_engine(2, 73);
        engine.state.tiles[4].owner = Some(PlayerId(1));
        engine.state.players[1].owned.insert(4);
        engine
            .apply_command_checked(PlayerId(0), Command::PayRent { tile: 4 })
            .unwrap();
        assert!(engine.state.rent_paid.contains(&4));
        engine
            .apply_command_checked(PlayerId(0), Command::Roll)
            .unwrap();
        engine
            .apply_command_checked(PlayerId(0), Command::EndTurn)
            .unwrap();
        assert!(engine.state.rent_paid.is_empty());
    }

    #[test]
    fn last_standing_wins() {
        let mut engine = calm_engine(2, 81);
        engine.state.players[1].balance = 0;
        engine
            .apply_command_checked(PlayerId(0), Command::Roll)
            .unwrap();
        let events = engine
            .apply_command_checked(PlayerId(0), Command::EndTurn)
            .unwrap();
        let outcome = engine.state.outcome.clone().expect("game over");
        assert_eq!(outcome.winner, PlayerId(0));
        assert_eq!(outcome.reason, WinReason::LastStanding);
        assert_eq!(engine.state.status, GameStatus::Finished);
        assert!(events.iter().any(|e| matches!(e, Event::GameEnded { .. })));

        // The finished game rejects further commands.
        assert_eq!(
            engine
                .apply_command_checked(PlayerId(1), Command::Roll)
                .unwrap_err(),
            RuleError::NotActive
        );
    }

    #[test]
    fn construction_goal_wins() {
        let mut engine = calm_engine(2, 83);
        engine.state.config.construction_goal = 2;
        engine.state.tiles[2].owner = Some(PlayerId(1));
        engine.state.tiles[2].tier1 = 2;
        engine.state.players[1].owned.insert(2);
        engine
            .apply_command_checked(PlayerId(0), Command::Roll)
            .unwrap();
        engine
            .apply_command_checked(PlayerId(0), Command::EndTurn)
            .unwrap();
        let outcome = engine.state.outcome.clone().expect("game over");
        assert_eq!(outcome.winner, PlayerId(1));
        assert_eq!(outcome.reason, WinReason::ConstructionGoal);
    }

    #[test]
    fn round_limit_richest_wins() {
        let mut engine = calm_engine(2, 85);
        engine.state.config.round_limit = 10;
        engine.state.round = 10;
        engine.state.players[0].balance = 500;
        engine.state.players[1].balance = 300;
        engine
            .apply_command_checked(PlayerId(0), Command::Roll)
            .unwrap();
        engine
            .apply_command_checked(PlayerId(0), Command::EndTurn)
            .unwrap();
        let outcome = engine.state.outcome.clone().expect("game over");
        assert_eq!(outcome.winner, PlayerId(0));
        assert_eq!(outcome.reason, WinReason::RichestAtLimit);
    }

    #[test]
    fn balances_never_negative_after_any_ledger_touchpoint() {
        // Drive a while on the embedded board with tiny balances; the clamp
        // must hold everywhere (tax, rent, cards).
        let board = load_board(BoardSource::Embedded).unwrap();
        let decks = load_decks(DeckSource::Embedded, &board).unwrap();
        let specs = [PlayerSpec::human("Alice"), PlayerSpec::human("Bob")];
        let mut engine = GameEngine::new_game_with_rules(
            GameConfig {
                initial_balance: 30,
                ..GameConfig::default()
            },
            board,
            decks,
            &specs,
            9,
        )
        .unwrap();

        for _ in 0..200 {
            if engine.state.status != GameStatus::Active {
                break;
            }
            let pid = engine.state.current_player;
            let _ = engine.apply_command_checked(pid, Command::Roll);
            if engine.state.pending_card.is_some() {
                engine
                    .apply_command_checked(pid, Command::AcknowledgeCard)
                    .unwrap();
            }
            let _ = engine.apply_command_checked(pid, Command::EndTurn);
            for player in &engine.state.players {
                assert!(player.balance >= 0, "{} went negative", player.name);
            }
        }
    }

    #[test]
    fn snapshot_roundtrip_preserves_the_dice_stream() {
        let board = load_board(BoardSource::Embedded).unwrap();
        let decks = load_decks(DeckSource::Embedded, &board).unwrap();
        let specs = [PlayerSpec::human("Alice"), PlayerSpec::human("Bob")];
        let mut original =
            GameEngine::new_game_with_rules(GameConfig::default(), board.clone(), decks.clone(), &specs, 17)
                .unwrap();

        // Advance a little so the RNG is mid-stream.
        let pid = original.state.current_player;
        let _ = original.apply_command_checked(pid, Command::Roll);
        if original.state.pending_card.is_some() {
            original
                .apply_command_checked(pid, Command::AcknowledgeCard)
                .unwrap();
        }

        let snapshot = original.snapshot();
        let mut restored =
            GameEngine::from_snapshot(GameConfig::default(), board, decks, &snapshot).unwrap();
        assert_eq!(restored.snapshot(), snapshot);

        // Identical subsequent behavior, dice included.
        let _ = original.apply_command_checked(pid, Command::EndTurn);
        let _ = restored.apply_command_checked(pid, Command::EndTurn);
        let next = original.state.current_player;
        let a = original.apply_command_checked(next, Command::Roll);
        let b = restored.apply_command_checked(next, Command::Roll);
        assert_eq!(a, b);
    }

    #[test]
    fn setup_rejects_bad_rosters() {
        let board = load_board(BoardSource::Embedded).unwrap();
        let decks = load_decks(DeckSource::Embedded, &board).unwrap();
        let one = [PlayerSpec::human("Alice")];
        assert!(matches!(
            GameEngine::new_game_with_rules(GameConfig::default(), board.clone(), decks.clone(), &one, 0),
            Err(SetupError::NotEnoughPlayers)
        ));
        let nine: Vec<PlayerSpec> = (0..9).map(|i| PlayerSpec::human(format!("P{i}"))).collect();
        assert!(matches!(
            GameEngine::new_game_with_rules(GameConfig::default(), board, decks, &nine, 0),
            Err(SetupError::TooManyPlayers)
        ));
    }
}
