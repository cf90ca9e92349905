//! AI opponent decision logic.
//!
//! Decisions are pure functions of the profile, the visible state, and an
//! injected RNG: one uniform draw compared against a computed probability.
//! Tests pin seeds or assert probability buckets, never exact outcomes.

use portside_protocol::{Command, Event, Money, PlayerId, Tier, TileKind};

use crate::engine::{GameEngine, RuleError};
use crate::ledger::{TIER1_RENT_STEP, TIER2_RENT_STEP};
use crate::rng::GameRng;

/// Minimum balance an AI keeps after buying a tile.
pub const PURCHASE_RESERVE: Money = 200;
/// Minimum balance an AI keeps after a tier-1 construction.
pub const TIER1_RESERVE: Money = 300;
/// Minimum balance an AI keeps after a tier-2 construction.
pub const TIER2_RESERVE: Money = 400;

/// Personality profile for an AI-controlled player. Trait weights are in
/// [0, 1] with 0.5 neutral.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AiProfile {
    /// Buy propensity.
    pub aggression: f32,
    /// Construct propensity.
    pub building: f32,
    /// Shades every decision probability around its midpoint.
    pub risk_tolerance: f32,
    /// Reserved for the trading module; not read by the engine yet.
    pub trade_propensity: f32,
    /// Pacing delay before acting, for display only.
    pub decision_delay_ms: u64,
}

impl Default for AiProfile {
    fn default() -> Self {
        Self::BALANCED
    }
}

impl AiProfile {
    pub const BALANCED: Self = Self {
        aggression: 0.5,
        building: 0.5,
        risk_tolerance: 0.5,
        trade_propensity: 0.5,
        decision_delay_ms: 800,
    };

    /// Hoards cash, buys rarely.
    pub const CAUTIOUS: Self = Self {
        aggression: 0.25,
        building: 0.35,
        risk_tolerance: 0.2,
        trade_propensity: 0.4,
        decision_delay_ms: 1200,
    };

    /// Buys nearly everything it lands on.
    pub const BOLD: Self = Self {
        aggression: 0.85,
        building: 0.6,
        risk_tolerance: 0.8,
        trade_propensity: 0.6,
        decision_delay_ms: 500,
    };

    /// Development-focused: moderate buying, heavy construction.
    pub const TYCOON: Self = Self {
        aggression: 0.55,
        building: 0.9,
        risk_tolerance: 0.6,
        trade_propensity: 0.5,
        decision_delay_ms: 900,
    };
}

fn risk_shade(profile: &AiProfile) -> f32 {
    (profile.risk_tolerance - 0.5) * 0.2
}

/// Probability of buying: weighted aggression plus a normalized
/// money-to-price ratio, shaded by risk tolerance.
pub fn purchase_probability(profile: &AiProfile, balance: Money, price: Money) -> f32 {
    let ratio = (balance as f32 / (price as f32 * 4.0)).clamp(0.0, 1.0);
    (0.55 * profile.aggression + 0.45 * ratio + risk_shade(profile)).clamp(0.0, 1.0)
}

/// Probability of building: weighted building trait plus a naive ROI term
/// (rent increase over cost), shaded by risk tolerance.
pub fn build_probability(profile: &AiProfile, cost: Money, rent_gain: Money) -> f32 {
    let roi = (rent_gain as f32 / cost as f32).clamp(0.0, 1.0);
    (0.5 * profile.building + 0.5 * roi + risk_shade(profile)).clamp(0.0, 1.0)
}

/// Buy decision: reserve check, then one draw against the probability.
pub fn wants_to_buy(
    profile: &AiProfile,
    balance: Money,
    price: Money,
    rng: &mut GameRng,
) -> bool {
    if balance - price < PURCHASE_RESERVE {
        return false;
    }
    rng.chance(purchase_probability(profile, balance, price))
}

/// Build decision for either tier. Same reserve-then-probability pattern.
pub fn wants_to_build(
    profile: &AiProfile,
    balance: Money,
    cost: Money,
    rent_gain: Money,
    tier: Tier,
    rng: &mut GameRng,
) -> bool {
    let reserve = match tier {
        Tier::One => TIER1_RESERVE,
        Tier::Two => TIER2_RESERVE,
    };
    if balance - cost < reserve {
        return false;
    }
    rng.chance(build_probability(profile, cost, rent_gain))
}

/// Drive one full AI turn through the engine's public command surface:
/// roll, acknowledge a drawn card, settle rent, maybe buy or build on the
/// landing tile, end the turn. The profile's decision delay is pacing
/// metadata for the caller; nothing here waits on it.
pub fn run_ai_turn(
    engine: &mut GameEngine,
    player: PlayerId,
    profile: &AiProfile,
    rng: &mut GameRng,
) -> Result<Vec<Event>, RuleError> {
    let mut events = engine.apply_command_checked(player, Command::Roll)?;

    if engine.state().pending_card().is_some() {
        events.extend(engine.apply_command_checked(player, Command::AcknowledgeCard)?);
    }

    // A failed jail release ends the movement phase; nothing to decide.
    if !engine.state().player(player).in_jail {
        let position = engine.state().player(player).position;
        let (kind, price) = {
            let def = engine.state().board().tile(position);
            (def.kind, def.price)
        };
        if kind == TileKind::Property {
            let owner = engine.state().tile_state(position).owner;
            let balance = engine.state().player(player).balance;
            match owner {
                None => {
                    if wants_to_buy(profile, balance, price, rng) {
                        events.extend(
                            engine.apply_command_checked(player, Command::BuyTile { tile: position })?,
                        );
                    }
                }
                Some(owner) if owner != player => {
                    if !engine.state().rent_already_paid(position) {
                        events.extend(
                            engine.apply_command_checked(player, Command::PayRent { tile: position })?,
                        );
                    }
                }
                Some(_) => {
                    events.extend(consider_building(engine, player, profile, position, rng)?);
                }
            }
        }
    }

    events.extend(engine.apply_command_checked(player, Command::EndTurn)?);
    Ok(events)
}

fn consider_building(
    engine: &mut GameEngine,
    player: PlayerId,
    profile: &AiProfile,
    tile: portside_protocol::TileIndex,
    rng: &mut GameRng,
) -> Result<Vec<Event>, RuleError> {
    let mut events = Vec::new();
    let (tier1_cost, tier2_cost) = {
        let def = engine.state().board().tile(tile);
        (def.tier1_cost, def.tier2_cost)
    };
    let visits = engine.state().player(player).visits_on(tile);
    let balance = engine.state().player(player).balance;

    if visits >= 3
        && wants_to_build(profile, balance, tier1_cost, TIER1_RENT_STEP, Tier::One, rng)
    {
        events.extend(engine.apply_command_checked(
            player,
            Command::Build {
                tile,
                tier: Tier::One,
            },
        )?);
    }

    let tier1_count = engine.state().tile_state(tile).tier1;
    let balance = engine.state().player(player).balance;
    if visits >= 1
        && tier1_count >= 1
        && wants_to_build(profile, balance, tier2_cost, TIER2_RENT_STEP, Tier::Two, rng)
    {
        events.extend(engine.apply_command_checked(
            player,
            Command::Build {
                tile,
                tier: Tier::Two,
            },
        )?);
    }

    Ok(events)
}
