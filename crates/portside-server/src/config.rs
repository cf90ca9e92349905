//! Server configuration

use std::time::Duration;

use portside_core::GameConfig;
use serde::{Deserialize, Serialize};

/// Session coordinator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Minimum players to start a game.
    pub min_players: u8,
    /// Maximum players allowed per game.
    pub max_players: u8,
    /// Rule tunables handed to each new engine.
    pub game: GameConfig,
    /// Bounded retry policy for persistence calls.
    pub retry: RetryPolicy,
    /// Buffered change notices per hub before slow subscribers lag.
    pub notify_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 8,
            game: GameConfig::default(),
            retry: RetryPolicy::default(),
            notify_capacity: 256,
        }
    }
}

/// Bounded retry for the external record store. Every call gets `timeout`;
/// exhausting `attempts` surfaces the failure to the caller instead of
/// hanging.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(2),
            backoff: Duration::from_millis(100),
        }
    }
}
