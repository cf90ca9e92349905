//! Server-authoritative game session.
//!
//! The authoritative rules live in `portside_core::GameEngine`; this module
//! wraps one engine per game and adds what the distributed variant needs:
//! turn-ownership validation atomic with the mutation (apply on a scratch
//! clone, commit only on success), persistence with bounded retry before the
//! in-memory commit, achievement observation, and change-notice publishing
//! after commit.

use portside_core::{observations_from_events, GameEngine, RuleError, Tracker, Unlock};
use portside_protocol::{
    Command, EntityKind, Event, GameId, LogEntry, PlayerId, Snapshot,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::RetryPolicy;
use crate::notify::ChangeHub;
use crate::store::{with_retry, AchievementRow, GameStore, SessionRow, StoreError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown game")]
    UnknownGame,
    #[error(transparent)]
    Setup(#[from] portside_core::SetupError),
    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),
}

/// Result of validating and applying one command.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// Command applied, persisted and published.
    Applied {
        events: Vec<Event>,
        version: u64,
        unlocks: Vec<Unlock>,
    },
    /// Caller does not own the active turn.
    NotYourTurn,
    /// Engine validation failed; no state changed anywhere.
    Rejected { reason: RuleError },
}

/// One game behind the coordinator. Callers serialize access per game (the
/// registry holds each session behind an async mutex).
pub struct GameSession {
    game: GameId,
    engine: GameEngine,
    tracker: Tracker,
    version: u64,
}

impl GameSession {
    pub fn new(game: GameId, engine: GameEngine) -> Self {
        let players = engine.state().players().len();
        Self {
            game,
            engine,
            tracker: Tracker::new(players),
            version: 0,
        }
    }

    pub fn game(&self) -> &GameId {
        &self.game
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> Snapshot {
        self.engine.snapshot()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    fn session_row(&self, snapshot: &Snapshot, version: u64) -> SessionRow {
        SessionRow {
            game: self.game.clone(),
            status: snapshot.status,
            player_order: snapshot.players.iter().map(|p| p.id).collect(),
            active_index: snapshot.current_player.0,
            round: snapshot.round,
            version,
            pending_card: snapshot.pending_card.clone(),
            rent_paid: snapshot.rent_paid.clone(),
            outcome: snapshot.outcome.clone(),
            rng_state: snapshot.rng_state,
        }
    }

    fn achievement_rows(&self, tracker: &Tracker, players: &[PlayerId]) -> Vec<AchievementRow> {
        players
            .iter()
            .flat_map(|&player| {
                tracker.records(player).iter().map(move |record| AchievementRow {
                    game: self.game.clone(),
                    player,
                    record: record.clone(),
                })
            })
            .collect()
    }

    /// Persist the freshly-created game and publish the first notices.
    pub async fn persist_initial<S: GameStore>(
        &mut self,
        store: &S,
        policy: &RetryPolicy,
        hub: &ChangeHub,
    ) -> Result<u64, SessionError> {
        let version = self.version + 1;
        let snapshot = self.engine.snapshot();
        let row = self.session_row(&snapshot, version);
        let players = snapshot.players.clone();
        let tiles = snapshot.tiles.clone();

        with_retry(policy, || store.write_session(row.clone())).await?;
        with_retry(policy, || {
            store.write_players(self.game.clone(), players.clone())
        })
        .await?;
        with_retry(policy, || store.write_tiles(self.game.clone(), tiles.clone())).await?;

        self.version = version;
        hub.publish(&self.game, EntityKind::Session, version);
        hub.publish(&self.game, EntityKind::Players, version);
        hub.publish(&self.game, EntityKind::Tiles, version);
        info!(game = %self.game, "game persisted and announced");
        Ok(version)
    }

    /// Validate and apply one command for `player`.
    ///
    /// The turn-ownership check happens inside the engine call on a scratch
    /// clone, atomically with the mutation: there is no window where the
    /// check passes against state another writer has since changed, because
    /// the caller holds this session exclusively. Persistence runs before
    /// the commit; a store failure rolls the whole mutation back.
    pub async fn apply<S: GameStore>(
        &mut self,
        store: &S,
        policy: &RetryPolicy,
        hub: &ChangeHub,
        player: PlayerId,
        command: Command,
        now_ms: u64,
    ) -> Result<ApplyOutcome, SessionError> {
        let mut scratch_engine = self.engine.clone();
        let events = match scratch_engine.apply_command_checked(player, command) {
            Ok(events) => events,
            Err(RuleError::NotYourTurn) => {
                debug!(game = %self.game, %player, "command out of turn");
                return Ok(ApplyOutcome::NotYourTurn);
            }
            Err(reason) => {
                debug!(game = %self.game, %player, %reason, "command rejected");
                return Ok(ApplyOutcome::Rejected { reason });
            }
        };

        let mut scratch_tracker = self.tracker.clone();
        let observations = observations_from_events(scratch_engine.state(), &events, now_ms);
        let unlocks = scratch_tracker.observe_all(&observations);

        let version = self.version + 1;
        let snapshot = scratch_engine.snapshot();
        let row = self.session_row(&snapshot, version);
        let players = snapshot.players.clone();
        let tiles = snapshot.tiles.clone();
        let new_log: Vec<LogEntry> = events
            .iter()
            .filter_map(|e| match e {
                Event::LogAppended { entry } => Some(entry.clone()),
                _ => None,
            })
            .collect();

        with_retry(policy, || store.write_session(row.clone())).await?;
        with_retry(policy, || {
            store.write_players(self.game.clone(), players.clone())
        })
        .await?;
        with_retry(policy, || store.write_tiles(self.game.clone(), tiles.clone())).await?;
        if !new_log.is_empty() {
            with_retry(policy, || store.append_log(self.game.clone(), new_log.clone())).await?;
        }
        if !unlocks.is_empty() {
            let player_ids: Vec<PlayerId> = unlocks.iter().map(|u| u.player).collect();
            let rows = self.achievement_rows(&scratch_tracker, &player_ids);
            with_retry(policy, || {
                store.write_achievements(self.game.clone(), rows.clone())
            })
            .await?;
        }

        // Commit only after every row landed.
        self.engine = scratch_engine;
        self.tracker = scratch_tracker;
        self.version = version;

        hub.publish(&self.game, EntityKind::Session, version);
        hub.publish(&self.game, EntityKind::Players, version);
        hub.publish(&self.game, EntityKind::Tiles, version);
        if !new_log.is_empty() {
            hub.publish(&self.game, EntityKind::Log, version);
        }
        if !unlocks.is_empty() {
            hub.publish(&self.game, EntityKind::Achievements, version);
        }

        Ok(ApplyOutcome::Applied {
            events,
            version,
            unlocks,
        })
    }

    /// Cancel the game (monotonic; a finished game stays finished).
    pub async fn cancel<S: GameStore>(
        &mut self,
        store: &S,
        policy: &RetryPolicy,
        hub: &ChangeHub,
    ) -> Result<u64, SessionError> {
        let mut scratch = self.engine.clone();
        scratch.cancel();

        let version = self.version + 1;
        let snapshot = scratch.snapshot();
        let row = self.session_row(&snapshot, version);
        with_retry(policy, || store.write_session(row.clone())).await?;

        self.engine = scratch;
        self.version = version;
        hub.publish(&self.game, EntityKind::Session, version);
        info!(game = %self.game, "game cancelled");
        Ok(version)
    }
}
