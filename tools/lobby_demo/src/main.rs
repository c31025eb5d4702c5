use async_trait::async_trait;
use ludum_client::{ClientContext, MemorySessionStore, OnlineGame};
use ludum_core::{
    ActivationEvent, EventTable, HeadlessSurface, LocalTransport, OnlinePhase, Phase, PhaseArgs,
    PhaseError, StartOutcome,
};
use ludum_peer::{Connection, MemoryHub, PeerConfig, PeerGame, PeerPhase};
use ludum_server::{Game, GameDefinition, ServerConfig, SessionCoordinator, SocketContext};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

struct Named(&'static str);

#[async_trait]
impl Phase for Named {
    fn id(&self) -> &str {
        self.0
    }

    async fn on_start(&self, _args: PhaseArgs) -> StartOutcome {
        println!("  -> entered {}", self.0);
        StartOutcome::Proceed
    }
}

/// Lobby until both seats are taken, then turns.
struct Duel;

#[async_trait]
impl GameDefinition for Duel {
    fn setup(&self, game: &Arc<Game>) -> Result<(), PhaseError> {
        game.register_phase(Arc::new(OnlinePhase::new(
            Named("Lobby"),
            EventTable::<SocketContext>::new(),
        )))?;
        let play = EventTable::<SocketContext>::new().on("endTurn", |ctx: SocketContext, _| async move {
            let (Some(game), Some(player_id)) = (ctx.game(), ctx.player_id()) else {
                return;
            };
            if game.active_players().contains(&player_id) {
                game.advance_active_player();
            }
        });
        game.register_phase(Arc::new(OnlinePhase::new(Named("Play"), play)))
    }

    async fn on_ready(&self, game: Arc<Game>) {
        if game.switch_phase("Play", Vec::new()).await.is_ok() {
            game.advance_active_player();
        }
    }
}

fn client(name: &'static str) -> Arc<OnlineGame> {
    let events = EventTable::<ClientContext>::new().on("activePlayers", move |_ctx, data: Value| async move {
        println!("[{}] active players: {}", name, data);
    });
    let game = OnlineGame::new(
        Arc::new(HeadlessSurface::new()),
        ActivationEvent::Click,
        Arc::new(MemorySessionStore::new()),
        events,
    );
    for id in ["Lobby", "Play"] {
        let phase = OnlinePhase::new(Named(id), EventTable::<ClientContext>::new());
        if let Err(err) = game.register_phase(Arc::new(phase)) {
            println!("[{}] {}", name, err);
        }
    }
    game
}

/// Answers every peer request with "pong".
struct Pong;

#[async_trait]
impl Phase for Pong {
    fn id(&self) -> &str {
        "Pong"
    }
}

#[async_trait]
impl PeerPhase for Pong {
    fn handles_peer_messages(&self) -> bool {
        true
    }

    async fn on_peer_message(&self, data: Value, from: Arc<dyn Connection>) -> Value {
        println!("[{}] says {}", from.peer(), data);
        json!("pong")
    }
}

async fn run_lobby() {
    println!("=== Server-mediated duel ===\n");
    let coordinator = SessionCoordinator::new(ServerConfig::default(), Duel);

    let ada = client("Ada");
    let bob = client("Bob");
    let (ada_server, ada_end) = LocalTransport::pair();
    let (bob_server, bob_end) = LocalTransport::pair();
    coordinator.accept(ada_server.clone());
    coordinator.accept(bob_server.clone());
    ada.connect(ada_end.clone());
    bob.connect(bob_end.clone());

    println!("Ada creates a game...");
    if let Err(err) = ada.create_game(Map::new()) {
        println!("create failed: {}", err);
        return;
    }
    sleep(Duration::from_millis(50)).await;
    let Some(session) = ada.session() else {
        println!("Ada never got a game id");
        return;
    };
    println!("Game {} created, Ada is {}\n", session.game_id, session.player_id);

    println!("Bob joins...");
    if let Err(err) = bob.join_game(&session.game_id, Map::new()) {
        println!("join failed: {}", err);
        return;
    }
    sleep(Duration::from_millis(50)).await;

    for _ in 0..3 {
        for player in [&ada, &bob] {
            let _ = player.emit("endTurn", Value::Null);
        }
        sleep(Duration::from_millis(20)).await;
    }

    println!("\n=== Games ===");
    for info in coordinator.list_games() {
        println!(
            "{}: phase {:?}, {}/{} players",
            info.game_id, info.phase, info.player_count, info.max_players
        );
    }
    coordinator.shutdown();
}

async fn run_peers() {
    println!("\n=== Peer-to-peer ping ===\n");
    let hub = MemoryHub::new();
    let host = PeerGame::new(hub.create_peer_with_id("host"), PeerConfig::default());
    let guest = PeerGame::new(hub.create_peer_with_id("guest"), PeerConfig::default());
    if host.register_phase(Arc::new(Pong)).is_err() || host.start(Vec::new()).await.is_err() {
        println!("host could not start");
        return;
    }

    let connection = guest.connect_to_peer("host").await;
    match guest.send_to_connection(&connection, json!("ping")).await {
        Ok(response) => println!("[{}] answered {}", response.connection.peer(), response.value),
        Err(err) => println!("ping failed: {}", err),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    run_lobby().await;
    run_peers().await;
    println!("\nDemo complete.");
}
