//! Portside coordinator demo binary.
//!
//! Hosts one all-AI game behind the full distributed path — commands go
//! through the session registry, state comes back from committed snapshots,
//! change notices flow over the hub — and logs the game as it plays out.
//! The AI decisions run here, on the client side of the coordinator, exactly
//! as a remote player process would drive its turns.

use std::sync::Arc;

use portside_core::{
    load_board, wants_to_build, wants_to_buy, AiProfile, Board, BoardSource, GameRng, PlayerSpec,
    TIER1_RENT_STEP,
};
use portside_protocol::{Command, Event, GameId, GameStatus, PlayerId, Tier, TileKind};
use portside_server::{ApplyOutcome, MemoryStore, ServerConfig, SessionError, SessionRegistry};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Portside coordinator v{}", env!("CARGO_PKG_VERSION"));

    let board = match load_board(BoardSource::Embedded) {
        Ok(board) => board,
        Err(e) => {
            error!("Failed to load board: {e}");
            return;
        }
    };

    let store = Arc::new(MemoryStore::new());
    let registry = SessionRegistry::new(store, ServerConfig::default());
    let game = GameId::new("harbor-demo");

    let specs = vec![
        PlayerSpec::ai("Amber"),
        PlayerSpec::ai("Briggs"),
        PlayerSpec::ai("Coral"),
        PlayerSpec::ai("Drake"),
    ];
    if let Err(e) = registry.create_game(game.clone(), &specs, 42).await {
        error!("Failed to create game: {e}");
        return;
    }

    // Watch the notice stream the way a client would.
    let mut sub = registry.subscribe(game.clone());
    tokio::spawn(async move {
        while let Some(notice) = sub.recv().await {
            tracing::debug!(entity = ?notice.entity, version = notice.version, "notice");
        }
    });

    let profiles = [
        AiProfile::BALANCED,
        AiProfile::BOLD,
        AiProfile::CAUTIOUS,
        AiProfile::TYCOON,
    ];
    let mut decision_rng = GameRng::seed_from_u64(7);

    loop {
        let (snapshot, _) = match registry.snapshot(&game) {
            Ok(committed) => committed,
            Err(e) => {
                error!("snapshot failed: {e}");
                return;
            }
        };
        if snapshot.status != GameStatus::Active {
            break;
        }
        let player = snapshot.current_player;
        let profile = profiles[player.index() % profiles.len()];
        if let Err(e) = drive_turn(&registry, &game, &board, player, &profile, &mut decision_rng).await
        {
            error!("turn failed: {e}");
            return;
        }
    }

    let (snapshot, _) = registry.snapshot(&game).expect("final snapshot");
    match snapshot.outcome {
        Some(outcome) => {
            let winner = &snapshot.players[outcome.winner.index()].name;
            info!(
                "Game over in round {}: {winner} wins ({})",
                outcome.round, outcome.reason
            );
        }
        None => info!("Game over without a winner"),
    }
}

/// Drive one remote AI turn through the coordinator's public surface.
async fn drive_turn<S: portside_server::GameStore>(
    registry: &SessionRegistry<S>,
    game: &GameId,
    board: &Board,
    player: PlayerId,
    profile: &AiProfile,
    rng: &mut GameRng,
) -> Result<(), SessionError> {
    submit(registry, game, player, Command::Roll).await?;

    let (snapshot, _) = registry.snapshot(game)?;
    if snapshot.pending_card.is_some() {
        submit(registry, game, player, Command::AcknowledgeCard).await?;
    }

    let (snapshot, _) = registry.snapshot(game)?;
    let me = &snapshot.players[player.index()];
    if !me.in_jail {
        let position = me.position;
        let def = board.tile(position);
        if def.kind == TileKind::Property {
            let tile = &snapshot.tiles[position];
            match tile.owner {
                None => {
                    if wants_to_buy(profile, me.balance, def.price, rng) {
                        submit(registry, game, player, Command::BuyTile { tile: position }).await?;
                    }
                }
                Some(owner) if owner != player => {
                    if !snapshot.rent_paid.contains(&position) {
                        submit(registry, game, player, Command::PayRent { tile: position }).await?;
                    }
                }
                Some(_) => {
                    let visits = me.visits.get(&position).copied().unwrap_or(0);
                    if visits >= 3
                        && wants_to_build(
                            profile,
                            me.balance,
                            def.tier1_cost,
                            TIER1_RENT_STEP,
                            Tier::One,
                            rng,
                        )
                    {
                        submit(
                            registry,
                            game,
                            player,
                            Command::Build {
                                tile: position,
                                tier: Tier::One,
                            },
                        )
                        .await?;
                    }
                }
            }
        }
    }

    submit(registry, game, player, Command::EndTurn).await?;
    Ok(())
}

async fn submit<S: portside_server::GameStore>(
    registry: &SessionRegistry<S>,
    game: &GameId,
    player: PlayerId,
    command: Command,
) -> Result<(), SessionError> {
    match registry.apply(game, player, command).await? {
        ApplyOutcome::Applied { events, .. } => {
            for event in events {
                if let Event::LogAppended { entry } = event {
                    info!("{}", entry.text);
                }
            }
        }
        ApplyOutcome::NotYourTurn => warn!(%player, "command out of turn"),
        ApplyOutcome::Rejected { reason } => warn!(%reason, "command rejected"),
    }
    Ok(())
}
