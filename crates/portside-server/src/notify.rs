//! Change notification publishing.
//!
//! The realtime transport is an excluded collaborator; the coordinator's
//! side of the contract is a payload-free [`ChangeNotice`] per committed
//! entity table, delivered at-least-once and ordered per entity by version.
//! Receivers refetch state on notify.

use portside_protocol::{ChangeNotice, EntityKind, GameId};
use tokio::sync::broadcast;
use tracing::debug;

/// Fan-out hub for change notices across all games.
#[derive(Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<ChangeNotice>,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish one notice. Lack of subscribers is not an error.
    pub fn publish(&self, game: &GameId, entity: EntityKind, version: u64) {
        let notice = ChangeNotice {
            game: game.clone(),
            entity,
            version,
        };
        debug!(game = %notice.game, ?entity, version, "change notice");
        let _ = self.tx.send(notice);
    }

    /// Subscribe to one game's notices.
    pub fn subscribe(&self, game: GameId) -> GameSubscription {
        GameSubscription {
            rx: self.tx.subscribe(),
            game,
        }
    }
}

/// Per-game filtered view of the hub.
pub struct GameSubscription {
    rx: broadcast::Receiver<ChangeNotice>,
    game: GameId,
}

impl GameSubscription {
    /// Next notice for the subscribed game, or `None` once the hub is gone.
    ///
    /// A lagged receiver skips ahead: dropped notices are safe because the
    /// consumer refetches the latest state on the next one.
    pub async fn recv(&mut self) -> Option<ChangeNotice> {
        loop {
            match self.rx.recv().await {
                Ok(notice) if notice.game == self.game => return Some(notice),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "notice subscriber lagged; refetch covers the gap");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
