//! Local (single-process) sessions and the headless self-play harness.
//!
//! [`LocalGame`] is the local deployment variant: the same engine driven
//! in-process, with AI turns auto-run after every human action. The engine
//! itself does not know which variant is driving it.
//!
//! [`run_selfplay`] runs AI-vs-AI games to completion on a fixed seed and
//! collects balance metrics; it doubles as the local variant's integration
//! surface.

use portside_protocol::{Command, Event, GameOutcome, GameStatus, Money, PlayerActivity, PlayerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::achievements::{observations_from_events, Tracker, Unlock};
use crate::ai::{self, AiProfile};
use crate::engine::{GameConfig, GameEngine, PlayerSpec, RuleError, SetupError};
use crate::rng::GameRng;

#[derive(Debug, Error)]
pub enum SelfPlayError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("engine rejected an AI command: {0}")]
    Rule(#[from] RuleError),
}

/// One game hosted in-process.
pub struct LocalGame {
    engine: GameEngine,
    profiles: Vec<AiProfile>,
    ai_rng: GameRng,
    tracker: Tracker,
    unlocks: Vec<Unlock>,
    /// Dice in flight: the UI defers resolution for the roll animation and a
    /// second roll request in that window is rejected.
    roll_pending: bool,
}

impl LocalGame {
    pub fn new(config: GameConfig, specs: &[PlayerSpec], seed: u64) -> Result<Self, SetupError> {
        let engine = GameEngine::new_game(config, specs, seed)?;
        let player_count = engine.state().players().len();
        Ok(Self {
            engine,
            profiles: vec![AiProfile::BALANCED; player_count],
            ai_rng: GameRng::seed_from_u64(seed ^ 0x5e1f_ca5e),
            tracker: Tracker::new(player_count),
            unlocks: Vec::new(),
            roll_pending: false,
        })
    }

    pub fn set_profile(&mut self, player: PlayerId, profile: AiProfile) {
        self.profiles[player.index()] = profile;
    }

    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn unlocks(&self) -> &[Unlock] {
        &self.unlocks
    }

    /// Start the dice animation window. The actual resolution happens in
    /// [`LocalGame::finish_roll`]; until then further roll requests bounce.
    pub fn begin_roll(&mut self) -> Result<(), RuleError> {
        if self.roll_pending {
            return Err(RuleError::RollInFlight);
        }
        let current = self.engine.state().current_player();
        if self.engine.state().player(current).has_rolled {
            return Err(RuleError::AlreadyRolled);
        }
        if self.engine.state().pending_card().is_some() {
            return Err(RuleError::CardPending);
        }
        self.roll_pending = true;
        Ok(())
    }

    /// Resolve the deferred roll.
    pub fn finish_roll(&mut self) -> Result<Vec<Event>, RuleError> {
        self.roll_pending = false;
        let current = self.engine.state().current_player();
        self.apply(current, Command::Roll)
    }

    /// Apply one command for a (human) player, then auto-run any AI players
    /// whose turn comes up. The AI's configured thinking delay is pacing
    /// metadata for the caller; nothing here sleeps.
    pub fn apply(&mut self, player: PlayerId, command: Command) -> Result<Vec<Event>, RuleError> {
        let mut events = self.engine.apply_command_checked(player, command)?;
        self.observe(&events);

        let max_ai_turns = self.engine.state().players().len().saturating_mul(4).max(1);
        let mut guard = 0usize;
        while self.engine.state().status() == GameStatus::Active
            && self.current_is_ai()
            && guard < max_ai_turns
        {
            let pid = self.engine.state().current_player();
            let profile = self.profiles[pid.index()];
            let ai_events = ai::run_ai_turn(&mut self.engine, pid, &profile, &mut self.ai_rng)?;
            self.observe(&ai_events);
            events.extend(ai_events);
            guard += 1;
        }

        Ok(events)
    }

    /// Renderer-facing status for one player. Read-only.
    pub fn activity(&self, player: PlayerId) -> PlayerActivity {
        let state = self.engine.state();
        if state.status() != GameStatus::Active || state.current_player() != player {
            return PlayerActivity::Waiting;
        }
        if state.player(player).is_ai {
            return PlayerActivity::Thinking;
        }
        if self.roll_pending || !state.player(player).has_rolled {
            return PlayerActivity::Rolling;
        }
        PlayerActivity::Acting
    }

    fn current_is_ai(&self) -> bool {
        let state = self.engine.state();
        state.player(state.current_player()).is_ai
    }

    fn observe(&mut self, events: &[Event]) {
        let now = u64::from(self.engine.state().round());
        let observations = observations_from_events(self.engine.state(), events, now);
        self.unlocks.extend(self.tracker.observe_all(&observations));
    }
}

/// Configuration for self-play simulation.
#[derive(Clone, Debug)]
pub struct SelfPlayConfig {
    /// Random seed for determinism.
    pub seed: u64,
    /// Number of players (all AI).
    pub num_players: usize,
    pub game: GameConfig,
    /// Profiles assigned round-robin to seats.
    pub profiles: Vec<AiProfile>,
    /// Hard stop in turns, above any round limit.
    pub max_turns: u32,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_players: 4,
            game: GameConfig::default(),
            profiles: vec![
                AiProfile::BALANCED,
                AiProfile::BOLD,
                AiProfile::CAUTIOUS,
                AiProfile::TYCOON,
            ],
            max_turns: 500,
        }
    }
}

/// Metrics collected during a self-play game.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GameMetrics {
    pub turns_played: u32,
    pub rounds_played: u32,
    pub tiles_bought: u32,
    pub constructions_built: u32,
    pub rents_paid: u32,
    pub cards_drawn: u32,
    pub jail_stays: u32,
    pub final_balances: Vec<Money>,
}

/// Result of a self-play game.
#[derive(Clone, Debug)]
pub struct SelfPlayResult {
    pub seed: u64,
    /// `None` only if the turn backstop tripped before any win condition.
    pub outcome: Option<GameOutcome>,
    pub metrics: GameMetrics,
    pub unlocks: Vec<Unlock>,
}

/// Run one AI-vs-AI game to completion.
pub fn run_selfplay(config: &SelfPlayConfig) -> Result<SelfPlayResult, SelfPlayError> {
    const NAMES: [&str; 8] = [
        "Amber", "Briggs", "Coral", "Drake", "Eddy", "Finch", "Gull", "Haven",
    ];
    let specs: Vec<PlayerSpec> = (0..config.num_players)
        .map(|i| PlayerSpec::ai(NAMES[i % NAMES.len()]))
        .collect();

    let mut engine = GameEngine::new_game(config.game.clone(), &specs, config.seed)?;
    let mut ai_rng = GameRng::seed_from_u64(config.seed ^ 0x5e1f_ca5e);
    let mut tracker = Tracker::new(config.num_players);
    let mut unlocks = Vec::new();
    let mut metrics = GameMetrics::default();

    while engine.state().status() == GameStatus::Active && metrics.turns_played < config.max_turns
    {
        let pid = engine.state().current_player();
        let profile = if config.profiles.is_empty() {
            AiProfile::BALANCED
        } else {
            config.profiles[pid.index() % config.profiles.len()]
        };
        let events = ai::run_ai_turn(&mut engine, pid, &profile, &mut ai_rng)?;

        for event in &events {
            match event {
                Event::TilePurchased { .. } => metrics.tiles_bought += 1,
                Event::ConstructionBuilt { .. } => metrics.constructions_built += 1,
                Event::RentPaid { .. } => metrics.rents_paid += 1,
                Event::CardDrawn { .. } => metrics.cards_drawn += 1,
                Event::StayedInJail { .. } => metrics.jail_stays += 1,
                _ => {}
            }
        }
        let now = u64::from(engine.state().round());
        let observations = observations_from_events(engine.state(), &events, now);
        unlocks.extend(tracker.observe_all(&observations));

        metrics.turns_played += 1;
    }

    metrics.rounds_played = engine.state().round();
    metrics.final_balances = engine.state().players().iter().map(|p| p.balance).collect();

    Ok(SelfPlayResult {
        seed: config.seed,
        outcome: engine.state().outcome().cloned(),
        metrics,
        unlocks,
    })
}
