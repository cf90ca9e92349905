//! Portside Session Coordinator
//!
//! Authoritative multiplayer layer over the `portside-core` rules engine:
//! one serialized writer per game, persistence with bounded retry, and
//! payload-free change notifications for refetch-on-notify clients.

pub mod config;
pub mod lobby;
pub mod notify;
pub mod registry;
pub mod session;
pub mod store;

pub use config::{RetryPolicy, ServerConfig};
pub use lobby::{Lobby, LobbyError, Seat};
pub use notify::{ChangeHub, GameSubscription};
pub use registry::SessionRegistry;
pub use session::{ApplyOutcome, GameSession, SessionError};
pub use store::{
    compose_snapshot, with_retry, AchievementRow, GameStore, MemoryStore, SessionRow, StoreError,
};
