//! Optimistic client-side state.
//!
//! Two explicit copies, never hand-merged: a locally-predicted engine that
//! applies the user's commands immediately, and the authoritative snapshot
//! that replaces the prediction wholesale whenever a confirmed refresh
//! arrives. Reconciliation is version-gated, so redelivered notifications
//! (at-least-once transport) are idempotent.

use portside_core::{GameConfig, GameEngine, RuleError, SetupError};
use portside_core::{load_board, load_decks, Board, BoardSource, DeckSource, Decks};
use portside_protocol::{
    Command, Event, GameStatus, PendingCard, PlayerActivity, PlayerId, Snapshot,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Setup(#[from] SetupError),
}

/// Client-side view of one game for one player.
pub struct ClientMirror {
    player: PlayerId,
    config: GameConfig,
    board: Board,
    decks: Decks,
    predicted: GameEngine,
    authoritative: Snapshot,
    version: u64,
}

impl ClientMirror {
    pub fn new(
        player: PlayerId,
        config: GameConfig,
        board: Board,
        decks: Decks,
        snapshot: Snapshot,
        version: u64,
    ) -> Result<Self, MirrorError> {
        let predicted =
            GameEngine::from_snapshot(config.clone(), board.clone(), decks.clone(), &snapshot)?;
        Ok(Self {
            player,
            config,
            board,
            decks,
            predicted,
            authoritative: snapshot,
            version,
        })
    }

    /// Convenience constructor on the embedded board and decks.
    pub fn with_embedded_rules(
        player: PlayerId,
        config: GameConfig,
        snapshot: Snapshot,
        version: u64,
    ) -> Result<Self, MirrorError> {
        let board = load_board(BoardSource::Embedded).map_err(SetupError::from)?;
        let decks = load_decks(DeckSource::Embedded, &board).map_err(SetupError::from)?;
        Self::new(player, config, board, decks, snapshot, version)
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Version of the last applied authoritative refresh.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The authoritative copy. Read-only for the renderer.
    pub fn authoritative(&self) -> &Snapshot {
        &self.authoritative
    }

    /// The locally-predicted copy (authoritative plus unconfirmed commands).
    pub fn predicted(&self) -> Snapshot {
        self.predicted.snapshot()
    }

    /// Pending card awaiting acknowledgement, from the predicted view.
    pub fn pending_card(&self) -> Option<PendingCard> {
        self.predicted.state().pending_card().cloned()
    }

    /// Apply a command optimistically, before the server confirms it. The
    /// authoritative copy is untouched; the next confirmed refresh replaces
    /// this prediction wholesale.
    pub fn predict(&mut self, command: Command) -> Result<Vec<Event>, RuleError> {
        self.predicted.apply_command_checked(self.player, command)
    }

    /// Accept an authoritative refresh. Returns `false` for stale or
    /// duplicate versions (idempotent redelivery), leaving everything
    /// unchanged — reprocessing the same state twice cannot double-apply
    /// log entries or achievement unlocks.
    pub fn reconcile(&mut self, snapshot: Snapshot, version: u64) -> Result<bool, MirrorError> {
        if version <= self.version {
            return Ok(false);
        }
        self.predicted = GameEngine::from_snapshot(
            self.config.clone(),
            self.board.clone(),
            self.decks.clone(),
            &snapshot,
        )?;
        self.authoritative = snapshot;
        self.version = version;
        Ok(true)
    }

    /// Renderer-facing per-player status, from the authoritative copy.
    pub fn activity(&self, player: PlayerId) -> PlayerActivity {
        let snap = &self.authoritative;
        if snap.status != GameStatus::Active || snap.current_player != player {
            return PlayerActivity::Waiting;
        }
        let Some(p) = snap.players.get(player.index()) else {
            return PlayerActivity::Waiting;
        };
        if p.is_ai {
            return PlayerActivity::Thinking;
        }
        if !p.has_rolled {
            return PlayerActivity::Rolling;
        }
        PlayerActivity::Acting
    }
}
