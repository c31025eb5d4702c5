use async_trait::async_trait;
use clap::Parser;
use ludum_core::{EventTable, OnlinePhase, Phase, PhaseArgs, PhaseError, StartOutcome};
use ludum_server::{listen, Game, GameDefinition, ServerConfig, SessionCoordinator, SocketContext};
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ludum-server", about = "Hosts turn-based Ludum games over WebSocket")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 1337)]
    port: u16,

    /// Players per game
    #[arg(long, default_value = "2")]
    max_players: NonZeroUsize,

    /// Milliseconds a disconnected player has to come back
    #[arg(long, default_value_t = 5000)]
    grace_period_ms: u64,

    /// Maximum number of concurrent games
    #[arg(long, default_value_t = 100)]
    max_games: usize,
}

struct Waiting;

#[async_trait]
impl Phase for Waiting {
    fn id(&self) -> &str {
        "WaitingPhase"
    }
}

struct Playing;

#[async_trait]
impl Phase for Playing {
    fn id(&self) -> &str {
        "PlayPhase"
    }

    async fn on_start(&self, _args: PhaseArgs) -> StartOutcome {
        tracing::info!("turns started");
        StartOutcome::Proceed
    }
}

/// Players take turns; the active player ends its turn with `endTurn`.
struct TurnsGame;

#[async_trait]
impl GameDefinition for TurnsGame {
    fn setup(&self, game: &Arc<Game>) -> Result<(), PhaseError> {
        game.register_phase(Arc::new(OnlinePhase::new(Waiting, EventTable::<SocketContext>::new())))?;

        let events: EventTable<SocketContext> = EventTable::new().on("endTurn", |ctx: SocketContext, _| async move {
            let (Some(game), Some(player_id)) = (ctx.game(), ctx.player_id()) else {
                return;
            };
            if game.active_players().contains(&player_id) {
                game.advance_active_player();
            }
        });
        game.register_phase(Arc::new(OnlinePhase::new(Playing, events)))
    }

    async fn on_ready(&self, game: Arc<Game>) {
        if let Err(err) = game.switch_phase("PlayPhase", Vec::new()).await {
            tracing::warn!(game_id = %game.id(), %err, "could not start play");
            return;
        }
        game.advance_active_player();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        max_players: args.max_players.get(),
        reconnect_grace_period: Duration::from_millis(args.grace_period_ms),
        max_games: args.max_games,
    };
    config.validate()?;
    let coordinator = SessionCoordinator::new(config, TurnsGame);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));

    tokio::select! {
        result = listen(Arc::clone(&coordinator), addr) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    coordinator.shutdown();
    Ok(())
}
