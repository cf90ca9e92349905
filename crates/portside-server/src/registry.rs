//! Per-game serialization of mutating calls.
//!
//! The registry holds every live session behind its own async mutex: calls
//! for the same game queue, calls for different games run concurrently.
//! Reads go through a separately-held committed snapshot, so they reflect
//! only fully-committed writes and never wait on a writer.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use portside_core::{GameEngine, PlayerSpec};
use portside_protocol::{Command, GameId, PlayerId, Snapshot};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::ServerConfig;
use crate::notify::{ChangeHub, GameSubscription};
use crate::session::{ApplyOutcome, GameSession, SessionError};
use crate::store::GameStore;

struct GameHandle {
    session: Mutex<GameSession>,
    committed: RwLock<(Snapshot, u64)>,
}

/// The session coordinator: single writer of authoritative state per game.
pub struct SessionRegistry<S: GameStore> {
    store: Arc<S>,
    hub: ChangeHub,
    config: ServerConfig,
    games: RwLock<HashMap<GameId, Arc<GameHandle>>>,
}

impl<S: GameStore> SessionRegistry<S> {
    pub fn new(store: Arc<S>, config: ServerConfig) -> Self {
        let hub = ChangeHub::new(config.notify_capacity);
        Self {
            store,
            hub,
            config,
            games: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Subscribe to one game's change notices.
    pub fn subscribe(&self, game: GameId) -> GameSubscription {
        self.hub.subscribe(game)
    }

    /// Create, persist and announce a new game.
    pub async fn create_game(
        &self,
        game: GameId,
        specs: &[PlayerSpec],
        seed: u64,
    ) -> Result<(Snapshot, u64), SessionError> {
        let engine = GameEngine::new_game(self.config.game.clone(), specs, seed)?;
        let mut session = GameSession::new(game.clone(), engine);
        let version = session
            .persist_initial(&*self.store, &self.config.retry, &self.hub)
            .await?;
        let snapshot = session.snapshot();

        let handle = Arc::new(GameHandle {
            session: Mutex::new(session),
            committed: RwLock::new((snapshot.clone(), version)),
        });
        self.games
            .write()
            .expect("registry lock poisoned")
            .insert(game.clone(), handle);
        info!(game = %game, players = specs.len(), "game created");
        Ok((snapshot, version))
    }

    /// Apply one command. Mutating calls for the same game are serialized by
    /// the session mutex; the turn-ownership check happens under that lock.
    pub async fn apply(
        &self,
        game: &GameId,
        player: PlayerId,
        command: Command,
    ) -> Result<ApplyOutcome, SessionError> {
        let handle = self.handle(game)?;
        let mut session = handle.session.lock().await;
        let outcome = session
            .apply(
                &*self.store,
                &self.config.retry,
                &self.hub,
                player,
                command,
                now_ms(),
            )
            .await?;
        if let ApplyOutcome::Applied { version, .. } = &outcome {
            *handle.committed.write().expect("committed lock poisoned") =
                (session.snapshot(), *version);
        }
        Ok(outcome)
    }

    /// Latest fully-committed snapshot. Concurrent with writers.
    pub fn snapshot(&self, game: &GameId) -> Result<(Snapshot, u64), SessionError> {
        let handle = self.handle(game)?;
        let committed = handle.committed.read().expect("committed lock poisoned");
        Ok(committed.clone())
    }

    /// Cancel a game.
    pub async fn cancel_game(&self, game: &GameId) -> Result<(), SessionError> {
        let handle = self.handle(game)?;
        let mut session = handle.session.lock().await;
        let version = session
            .cancel(&*self.store, &self.config.retry, &self.hub)
            .await?;
        *handle.committed.write().expect("committed lock poisoned") =
            (session.snapshot(), version);
        Ok(())
    }

    fn handle(&self, game: &GameId) -> Result<Arc<GameHandle>, SessionError> {
        self.games
            .read()
            .expect("registry lock poisoned")
            .get(game)
            .cloned()
            .ok_or(SessionError::UnknownGame)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
