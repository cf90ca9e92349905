//! Persistence interface to the external record store.
//!
//! The store itself is an excluded collaborator; this module defines the
//! row-level CRUD surface the coordinator needs (session/player/tile/
//! achievement rows plus an append-only log, keyed by game id), a bounded
//! retry wrapper, and an in-memory implementation used by tests and the demo
//! binary.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use portside_core::AchievementRecord;
use portside_protocol::{
    GameId, GameOutcome, GameStatus, LogEntry, PendingCard, PlayerId, PlayerSnapshot, Snapshot,
    TileIndex, TileState,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::RetryPolicy;

#[derive(Clone, Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation timed out")]
    Timeout,
}

/// GameSession row. Together with the player/tile/log rows this is enough to
/// reconstruct a full [`Snapshot`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRow {
    pub game: GameId,
    pub status: GameStatus,
    pub player_order: Vec<PlayerId>,
    pub active_index: u8,
    pub round: u32,
    pub version: u64,
    #[serde(default)]
    pub pending_card: Option<PendingCard>,
    #[serde(default)]
    pub rent_paid: Vec<TileIndex>,
    #[serde(default)]
    pub outcome: Option<GameOutcome>,
    pub rng_state: [u8; 32],
}

/// AchievementRecord row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AchievementRow {
    pub game: GameId,
    pub player: PlayerId,
    pub record: AchievementRecord,
}

/// CRUD surface of the record store. Calls may fail or hang; callers wrap
/// every one in [`with_retry`].
pub trait GameStore: Send + Sync + 'static {
    fn read_session(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<Option<SessionRow>, StoreError>> + Send;
    fn write_session(
        &self,
        row: SessionRow,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn read_players(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<Vec<PlayerSnapshot>, StoreError>> + Send;
    fn write_players(
        &self,
        game: GameId,
        players: Vec<PlayerSnapshot>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn read_tiles(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<Vec<TileState>, StoreError>> + Send;
    fn write_tiles(
        &self,
        game: GameId,
        tiles: Vec<TileState>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Append-only; entries are never rewritten.
    fn append_log(
        &self,
        game: GameId,
        entries: Vec<LogEntry>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
    fn read_log(&self, game: GameId)
        -> impl Future<Output = Result<Vec<LogEntry>, StoreError>> + Send;

    fn read_achievements(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<Vec<AchievementRow>, StoreError>> + Send;
    fn write_achievements(
        &self,
        game: GameId,
        rows: Vec<AchievementRow>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Run one store operation under the bounded retry policy. Each attempt gets
/// the policy timeout; exhaustion surfaces the last error.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut last = StoreError::Timeout;
    for attempt in 1..=policy.attempts.max(1) {
        match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                warn!("store attempt {attempt} failed: {err}");
                last = err;
            }
            Err(_) => {
                warn!("store attempt {attempt} timed out");
                last = StoreError::Timeout;
            }
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.backoff).await;
        }
    }
    Err(last)
}

/// Rebuild a full snapshot from persisted rows (refetch-on-notify path).
pub fn compose_snapshot(
    session: &SessionRow,
    players: Vec<PlayerSnapshot>,
    tiles: Vec<TileState>,
    log: Vec<LogEntry>,
) -> Snapshot {
    Snapshot {
        status: session.status,
        round: session.round,
        current_player: PlayerId(session.active_index),
        players,
        tiles,
        pending_card: session.pending_card.clone(),
        log,
        rent_paid: session.rent_paid.clone(),
        outcome: session.outcome.clone(),
        rng_state: session.rng_state,
    }
}

#[derive(Clone, Debug, Default)]
struct GameRows {
    session: Option<SessionRow>,
    players: Vec<PlayerSnapshot>,
    tiles: Vec<TileState>,
    log: Vec<LogEntry>,
    achievements: Vec<AchievementRow>,
}

/// In-memory store with failure injection, for tests and the demo binary.
#[derive(Default)]
pub struct MemoryStore {
    games: Mutex<HashMap<GameId, GameRows>>,
    fail_next: AtomicU32,
    stall_next: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` operations fail with `Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` operations hang well past any sane timeout.
    pub fn stall_next(&self, n: u32) {
        self.stall_next.store(n, Ordering::SeqCst);
    }

    async fn gate(&self) -> Result<(), StoreError> {
        if self
            .stall_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        Ok(())
    }

    fn with_rows<T>(&self, game: &GameId, f: impl FnOnce(&mut GameRows) -> T) -> T {
        let mut games = self.games.lock().expect("store lock poisoned");
        f(games.entry(game.clone()).or_default())
    }
}

impl GameStore for MemoryStore {
    async fn read_session(&self, game: GameId) -> Result<Option<SessionRow>, StoreError> {
        self.gate().await?;
        Ok(self.with_rows(&game, |rows| rows.session.clone()))
    }

    async fn write_session(&self, row: SessionRow) -> Result<(), StoreError> {
        self.gate().await?;
        let game = row.game.clone();
        self.with_rows(&game, |rows| rows.session = Some(row));
        Ok(())
    }

    async fn read_players(&self, game: GameId) -> Result<Vec<PlayerSnapshot>, StoreError> {
        self.gate().await?;
        Ok(self.with_rows(&game, |rows| rows.players.clone()))
    }

    async fn write_players(
        &self,
        game: GameId,
        players: Vec<PlayerSnapshot>,
    ) -> Result<(), StoreError> {
        self.gate().await?;
        self.with_rows(&game, |rows| rows.players = players);
        Ok(())
    }

    async fn read_tiles(&self, game: GameId) -> Result<Vec<TileState>, StoreError> {
        self.gate().await?;
        Ok(self.with_rows(&game, |rows| rows.tiles.clone()))
    }

    async fn write_tiles(&self, game: GameId, tiles: Vec<TileState>) -> Result<(), StoreError> {
        self.gate().await?;
        self.with_rows(&game, |rows| rows.tiles = tiles);
        Ok(())
    }

    async fn append_log(&self, game: GameId, entries: Vec<LogEntry>) -> Result<(), StoreError> {
        self.gate().await?;
        self.with_rows(&game, |rows| rows.log.extend(entries));
        Ok(())
    }

    async fn read_log(&self, game: GameId) -> Result<Vec<LogEntry>, StoreError> {
        self.gate().await?;
        Ok(self.with_rows(&game, |rows| rows.log.clone()))
    }

    async fn read_achievements(&self, game: GameId) -> Result<Vec<AchievementRow>, StoreError> {
        self.gate().await?;
        Ok(self.with_rows(&game, |rows| rows.achievements.clone()))
    }

    async fn write_achievements(
        &self,
        game: GameId,
        rows_in: Vec<AchievementRow>,
    ) -> Result<(), StoreError> {
        self.gate().await?;
        self.with_rows(&game, |rows| {
            for row in rows_in {
                match rows
                    .achievements
                    .iter_mut()
                    .find(|r| r.player == row.player && r.record.achievement == row.record.achievement)
                {
                    Some(existing) => *existing = row,
                    None => rows.achievements.push(row),
                }
            }
        });
        Ok(())
    }
}
