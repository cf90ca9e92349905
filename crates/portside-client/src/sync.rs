//! Refetch-on-notify synchronization.
//!
//! Change notices carry no payload; on every notice for the subscribed game
//! the driver refetches the latest committed snapshot and hands it to the
//! mirror, whose version gate makes redelivery and reordering harmless.

use std::future::Future;

use portside_protocol::{ChangeNotice, GameId, Snapshot};
use thiserror::Error;
use tracing::debug;

use crate::mirror::{ClientMirror, MirrorError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("snapshot fetch failed: {0}")]
    Fetch(String),
    #[error(transparent)]
    Mirror(#[from] MirrorError),
}

/// Where the driver refetches committed state from (the persistence
/// collaborator, or the coordinator's read path).
pub trait SnapshotSource: Send + Sync {
    fn fetch(
        &self,
        game: &GameId,
    ) -> impl Future<Output = Result<(Snapshot, u64), SyncError>> + Send;
}

/// The subscribe-by-game-id notice stream. `None` means the stream closed.
pub trait NoticeSource: Send {
    fn next_notice(&mut self) -> impl Future<Output = Option<ChangeNotice>> + Send;
}

impl NoticeSource for tokio::sync::mpsc::Receiver<ChangeNotice> {
    async fn next_notice(&mut self) -> Option<ChangeNotice> {
        self.recv().await
    }
}

/// Pumps notices into authoritative refreshes for one mirror.
pub struct SyncDriver<N, F> {
    game: GameId,
    mirror: ClientMirror,
    notices: N,
    source: F,
}

impl<N: NoticeSource, F: SnapshotSource> SyncDriver<N, F> {
    pub fn new(game: GameId, mirror: ClientMirror, notices: N, source: F) -> Self {
        Self {
            game,
            mirror,
            notices,
            source,
        }
    }

    pub fn mirror(&self) -> &ClientMirror {
        &self.mirror
    }

    pub fn mirror_mut(&mut self) -> &mut ClientMirror {
        &mut self.mirror
    }

    /// Process one notice. `Ok(None)` means the stream closed; otherwise the
    /// boolean reports whether the refresh advanced the mirror.
    pub async fn step(&mut self) -> Result<Option<bool>, SyncError> {
        let Some(notice) = self.notices.next_notice().await else {
            return Ok(None);
        };
        if notice.game != self.game {
            return Ok(Some(false));
        }
        let (snapshot, version) = self.source.fetch(&self.game).await?;
        let applied = self.mirror.reconcile(snapshot, version)?;
        debug!(
            game = %self.game,
            notice_version = notice.version,
            fetched_version = version,
            applied,
            "sync step"
        );
        Ok(Some(applied))
    }

    /// Run until the notice stream closes.
    pub async fn run(&mut self) -> Result<(), SyncError> {
        while self.step().await?.is_some() {}
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portside_core::{GameConfig, GameEngine, PlayerSpec};
    use portside_protocol::{Command, EntityKind, PlayerId};
    use std::sync::{Arc, Mutex};

    /// Test source backed by a shared committed cell, standing in for the
    /// record store.
    #[derive(Clone)]
    struct CellSource(Arc<Mutex<(Snapshot, u64)>>);

    impl SnapshotSource for CellSource {
        async fn fetch(&self, _game: &GameId) -> Result<(Snapshot, u64), SyncError> {
            Ok(self.0.lock().expect("cell lock").clone())
        }
    }

    fn notice(game: &GameId, version: u64) -> ChangeNotice {
        ChangeNotice {
            game: game.clone(),
            entity: EntityKind::Session,
            version,
        }
    }

    #[tokio::test]
    async fn driver_applies_refreshes_and_dedupes_redelivery() {
        let game = GameId::new("g1");
        let specs = [PlayerSpec::human("Alice"), PlayerSpec::human("Bob")];
        let mut server = GameEngine::new_game(GameConfig::default(), &specs, 41).unwrap();

        let cell = Arc::new(Mutex::new((server.snapshot(), 1)));
        let mirror = ClientMirror::with_embedded_rules(
            PlayerId(1),
            GameConfig::default(),
            server.snapshot(),
            1,
        )
        .unwrap();

        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let mut driver = SyncDriver::new(game.clone(), mirror, rx, CellSource(cell.clone()));

        // Server advances; the committed cell and two notices (at-least-once)
        // go out.
        server
            .apply_command_checked(PlayerId(0), Command::Roll)
            .unwrap();
        *cell.lock().unwrap() = (server.snapshot(), 2);
        tx.send(notice(&game, 2)).await.unwrap();
        tx.send(notice(&game, 2)).await.unwrap();

        assert_eq!(driver.step().await.unwrap(), Some(true));
        assert_eq!(driver.mirror().authoritative(), &server.snapshot());
        // The duplicate notice refetches but changes nothing.
        assert_eq!(driver.step().await.unwrap(), Some(false));
        assert_eq!(driver.mirror().version(), 2);

        // Notices for other games are ignored without a fetch.
        tx.send(notice(&GameId::new("other"), 9)).await.unwrap();
        assert_eq!(driver.step().await.unwrap(), Some(false));

        // Closing the stream ends the run loop.
        drop(tx);
        assert_eq!(driver.step().await.unwrap(), None);
    }
}
