//! Achievement tracking.
//!
//! The tracker observes metric values derived from engine events; it is the
//! only writer of achievement records, and unlocks are monotonic: once
//! unlocked, no later observation re-locks or regresses progress.

use portside_protocol::{Event, PlayerId};
use serde::{Deserialize, Serialize};

use crate::engine::GameState;

/// How a definition's target is compared against observed values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// `value >= target` (or `value < target` when the observation asks for
    /// less-than semantics).
    Threshold,
    /// Like `Threshold`, but progress is always tracked.
    Counter,
    /// Consecutive-occurrence count, `value >= target`.
    Streak,
    /// A boolean context flag computed by the observer.
    Combo,
    /// Any positive observation unlocks.
    OneShot,
}

/// One entry of the fixed achievement catalog.
#[derive(Clone, Debug)]
pub struct AchievementDef {
    pub id: &'static str,
    pub name: &'static str,
    /// Metric this definition watches.
    pub metric: &'static str,
    pub condition: ConditionKind,
    pub target: i64,
}

/// Per-player progress for one catalog entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AchievementRecord {
    pub achievement: String,
    pub unlocked: bool,
    pub progress: i64,
    pub unlocked_at: Option<u64>,
}

/// Extra context for one observation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObserveCtx {
    /// Request less-than semantics for threshold comparisons.
    pub less_than: bool,
    /// Combo flag computed by the observer.
    pub combo: bool,
    /// Caller-supplied unlock timestamp (millis or round tick).
    pub now: u64,
}

/// One metric observation, usually derived from an event batch.
#[derive(Clone, Debug)]
pub struct MetricObservation {
    pub player: PlayerId,
    pub metric: &'static str,
    pub value: i64,
    pub ctx: ObserveCtx,
}

/// A freshly-triggered unlock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unlock {
    pub player: PlayerId,
    pub achievement: String,
    pub at: u64,
}

/// The built-in catalog.
pub fn default_catalog() -> Vec<AchievementDef> {
    vec![
        AchievementDef {
            id: "first_berth",
            name: "First Berth",
            metric: "tile_bought",
            condition: ConditionKind::OneShot,
            target: 1,
        },
        AchievementDef {
            id: "landlord",
            name: "Landlord",
            metric: "tiles_owned",
            condition: ConditionKind::Counter,
            target: 4,
        },
        AchievementDef {
            id: "master_builder",
            name: "Master Builder",
            metric: "tier1_total",
            condition: ConditionKind::Counter,
            target: 5,
        },
        AchievementDef {
            id: "high_roller",
            name: "High Roller",
            metric: "double_streak",
            condition: ConditionKind::Streak,
            target: 2,
        },
        AchievementDef {
            id: "toll_collector",
            name: "Toll Collector",
            metric: "rent_collected",
            condition: ConditionKind::Threshold,
            target: 100,
        },
        AchievementDef {
            id: "scraping_by",
            name: "Scraping By",
            metric: "balance_low",
            condition: ConditionKind::Threshold,
            target: 50,
        },
        AchievementDef {
            id: "lucky_break",
            name: "Lucky Break",
            metric: "lucky_release",
            condition: ConditionKind::OneShot,
            target: 1,
        },
        AchievementDef {
            id: "harbor_tycoon",
            name: "Harbor Tycoon",
            metric: "portfolio",
            condition: ConditionKind::Combo,
            target: 1,
        },
        AchievementDef {
            id: "champion",
            name: "Champion",
            metric: "game_won",
            condition: ConditionKind::OneShot,
            target: 1,
        },
    ]
}

/// Per-game achievement state for all players.
#[derive(Clone, Debug)]
pub struct Tracker {
    catalog: Vec<AchievementDef>,
    records: Vec<Vec<AchievementRecord>>,
}

impl Tracker {
    pub fn new(player_count: usize) -> Self {
        Self::with_catalog(default_catalog(), player_count)
    }

    pub fn with_catalog(catalog: Vec<AchievementDef>, player_count: usize) -> Self {
        let records = (0..player_count)
            .map(|_| {
                catalog
                    .iter()
                    .map(|def| AchievementRecord {
                        achievement: def.id.to_string(),
                        unlocked: false,
                        progress: 0,
                        unlocked_at: None,
                    })
                    .collect()
            })
            .collect();
        Self { catalog, records }
    }

    /// Restore a player's records (e.g. from persisted rows). Entries that
    /// don't match the catalog are ignored.
    pub fn restore(&mut self, player: PlayerId, rows: &[AchievementRecord]) {
        for row in rows {
            if let Some(idx) = self.catalog.iter().position(|d| d.id == row.achievement) {
                self.records[player.index()][idx] = row.clone();
            }
        }
    }

    pub fn records(&self, player: PlayerId) -> &[AchievementRecord] {
        &self.records[player.index()]
    }

    /// Apply one observation: scan the player's locked records whose metric
    /// matches and run the condition-specific comparison.
    pub fn observe(
        &mut self,
        player: PlayerId,
        metric: &str,
        value: i64,
        ctx: ObserveCtx,
    ) -> Vec<Unlock> {
        let mut unlocks = Vec::new();
        let records = &mut self.records[player.index()];

        for (def, record) in self.catalog.iter().zip(records.iter_mut()) {
            if record.unlocked || def.metric != metric {
                continue;
            }

            let satisfied = match def.condition {
                ConditionKind::Threshold => {
                    if ctx.less_than {
                        value < def.target
                    } else {
                        value >= def.target
                    }
                }
                ConditionKind::Counter | ConditionKind::Streak => value >= def.target,
                ConditionKind::Combo => ctx.combo,
                ConditionKind::OneShot => value > 0,
            };

            if satisfied {
                record.unlocked = true;
                record.unlocked_at = Some(ctx.now);
                record.progress = def.target;
                unlocks.push(Unlock {
                    player,
                    achievement: def.id.to_string(),
                    at: ctx.now,
                });
            } else if !ctx.less_than {
                // Progress never regresses.
                record.progress = record.progress.max(value.min(def.target));
            }
        }

        unlocks
    }

    /// Run a batch of observations, collecting every unlock.
    pub fn observe_all(&mut self, observations: &[MetricObservation]) -> Vec<Unlock> {
        observations
            .iter()
            .flat_map(|o| self.observe(o.player, o.metric, o.value, o.ctx))
            .collect()
    }
}

/// Translate an applied event batch into metric observations, reading
/// cumulative values from the post-commit state. Keeping this in one place
/// means the engine never touches achievement records.
pub fn observations_from_events(
    state: &GameState,
    events: &[Event],
    now: u64,
) -> Vec<MetricObservation> {
    let mut out = Vec::new();
    let ctx = ObserveCtx {
        now,
        ..ObserveCtx::default()
    };

    for event in events {
        match event {
            Event::TilePurchased { player, .. } => {
                out.push(MetricObservation {
                    player: *player,
                    metric: "tile_bought",
                    value: 1,
                    ctx,
                });
                let owned = state.player(*player).owned.len() as i64;
                out.push(MetricObservation {
                    player: *player,
                    metric: "tiles_owned",
                    value: owned,
                    ctx,
                });
                push_portfolio(&mut out, state, *player, now);
            }
            Event::ConstructionBuilt { player, .. } => {
                let tier1_total: i64 = state
                    .player(*player)
                    .owned
                    .iter()
                    .map(|&t| i64::from(state.tile_state(t).tier1))
                    .sum();
                out.push(MetricObservation {
                    player: *player,
                    metric: "tier1_total",
                    value: tier1_total,
                    ctx,
                });
            }
            Event::DiceRolled { player, doubles, .. } if *doubles => {
                let streak = i64::from(state.player(*player).consecutive_doubles);
                out.push(MetricObservation {
                    player: *player,
                    metric: "double_streak",
                    value: streak,
                    ctx,
                });
            }
            Event::RentPaid { owner, amount, .. } => {
                out.push(MetricObservation {
                    player: *owner,
                    metric: "rent_collected",
                    value: *amount,
                    ctx,
                });
            }
            Event::BalanceChanged { player, delta, balance, .. } if *delta < 0 => {
                out.push(MetricObservation {
                    player: *player,
                    metric: "balance_low",
                    value: *balance,
                    ctx: ObserveCtx {
                        less_than: true,
                        combo: false,
                        now,
                    },
                });
            }
            Event::ReleasedFromJail {
                player,
                how: portside_protocol::JailRelease::LuckyRoll,
            } => {
                out.push(MetricObservation {
                    player: *player,
                    metric: "lucky_release",
                    value: 1,
                    ctx,
                });
            }
            Event::GameEnded { outcome } => {
                out.push(MetricObservation {
                    player: outcome.winner,
                    metric: "game_won",
                    value: 1,
                    ctx,
                });
            }
            _ => {}
        }
    }

    out
}

fn push_portfolio(
    out: &mut Vec<MetricObservation>,
    state: &GameState,
    player: PlayerId,
    now: u64,
) {
    let p = state.player(player);
    let combo = p.owned.len() >= 3 && p.balance >= 800;
    out.push(MetricObservation {
        player,
        metric: "portfolio",
        value: 1,
        ctx: ObserveCtx {
            less_than: false,
            combo,
            now,
        },
    });
}
