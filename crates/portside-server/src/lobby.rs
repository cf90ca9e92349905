//! Lobby management for pre-game player coordination.
//!
//! Establishes the ordered player list (join order is turn order) before the
//! authoritative engine exists. Join codes and reconnect tokens are random;
//! game randomness stays in the deterministic core RNG.

use portside_core::PlayerSpec;
use portside_protocol::PlayerId;
use rand::{distributions::Alphanumeric, Rng};

/// Lobby state before a game starts.
#[derive(Debug, Clone)]
pub struct Lobby {
    code: String,
    seats: Vec<Seat>,
    host: Option<PlayerId>,
    min_players: u8,
    max_players: u8,
    started: bool,
}

/// Per-player lobby info.
#[derive(Debug, Clone)]
pub struct Seat {
    pub player_id: PlayerId,
    pub name: String,
    pub is_ai: bool,
    pub ready: bool,
    pub reconnect_token: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("Lobby is full")]
    LobbyFull,
    #[error("Game already started")]
    GameAlreadyStarted,
    #[error("Invalid join code")]
    InvalidCode,
    #[error("Invalid reconnect token")]
    InvalidToken,
    #[error("Player not in lobby")]
    NotInLobby,
    #[error("Cannot start: not enough players or not all ready")]
    CannotStart,
    #[error("Only host can perform this action")]
    NotHost,
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

impl Lobby {
    pub fn new(min_players: u8, max_players: u8) -> Self {
        Self {
            code: random_string(6).to_uppercase(),
            seats: Vec::new(),
            host: None,
            min_players,
            max_players,
            started: false,
        }
    }

    /// Join code players use to enter this lobby.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn is_host(&self, player: PlayerId) -> bool {
        self.host == Some(player)
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    /// Add a human player. Returns their seat id and reconnect token.
    pub fn join(&mut self, code: &str, name: String) -> Result<(PlayerId, String), LobbyError> {
        if self.started {
            return Err(LobbyError::GameAlreadyStarted);
        }
        if !code.eq_ignore_ascii_case(&self.code) {
            return Err(LobbyError::InvalidCode);
        }
        if self.seats.len() >= self.max_players as usize {
            return Err(LobbyError::LobbyFull);
        }

        let player_id = PlayerId(self.seats.len() as u8);
        let token = random_string(16);
        self.seats.push(Seat {
            player_id,
            name,
            is_ai: false,
            ready: false,
            reconnect_token: token.clone(),
        });

        // First player becomes host.
        if self.host.is_none() {
            self.host = Some(player_id);
        }

        Ok((player_id, token))
    }

    /// Add an AI seat (host action). AI seats are always ready.
    pub fn add_ai(&mut self, by: PlayerId, name: String) -> Result<PlayerId, LobbyError> {
        if self.started {
            return Err(LobbyError::GameAlreadyStarted);
        }
        if !self.is_host(by) {
            return Err(LobbyError::NotHost);
        }
        if self.seats.len() >= self.max_players as usize {
            return Err(LobbyError::LobbyFull);
        }
        let player_id = PlayerId(self.seats.len() as u8);
        self.seats.push(Seat {
            player_id,
            name,
            is_ai: true,
            ready: true,
            reconnect_token: String::new(),
        });
        Ok(player_id)
    }

    pub fn set_ready(&mut self, player: PlayerId, ready: bool) -> Result<(), LobbyError> {
        if self.started {
            return Err(LobbyError::GameAlreadyStarted);
        }
        let seat = self
            .seats
            .iter_mut()
            .find(|s| s.player_id == player)
            .ok_or(LobbyError::NotInLobby)?;
        seat.ready = ready;
        Ok(())
    }

    /// Resolve a reconnect token back to a seat.
    pub fn reconnect(&self, token: &str) -> Result<PlayerId, LobbyError> {
        if token.is_empty() {
            return Err(LobbyError::InvalidToken);
        }
        self.seats
            .iter()
            .find(|s| s.reconnect_token == token)
            .map(|s| s.player_id)
            .ok_or(LobbyError::InvalidToken)
    }

    pub fn can_start(&self) -> bool {
        !self.started
            && self.seats.len() >= self.min_players as usize
            && self.seats.iter().all(|s| s.ready)
    }

    /// Start the game (host only). Returns the ordered roster that seeds the
    /// engine's turn sequence.
    pub fn start(&mut self, by: PlayerId) -> Result<Vec<PlayerSpec>, LobbyError> {
        if !self.is_host(by) {
            return Err(LobbyError::NotHost);
        }
        if !self.can_start() {
            return Err(LobbyError::CannotStart);
        }
        self.started = true;
        Ok(self
            .seats
            .iter()
            .map(|s| PlayerSpec {
                name: s.name.clone(),
                is_ai: s.is_ai,
            })
            .collect())
    }
}
