use crate::errors::{CreateGameError, JoinError, ReconnectError};
use crate::game::{Game, SocketContext};
use crate::types::{GameId, GameInfo, PlayerId, ServerConfig};
use async_trait::async_trait;
use ludum_core::protocol::{
    to_payload, ControlEvent, CreateGameRequest, JoinErrorNotice, JoinGameRequest, PlayerNotice,
    SessionIds,
};
use ludum_core::sync::lock;
use ludum_core::{
    Bindings, EventTable, GlobalIdGenerator, IdGenerator, PhaseError, Transport, TransportId,
    DISCONNECT_EVENT,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::task::JoinHandle;

/// The game type a coordinator hosts.
#[async_trait]
pub trait GameDefinition: Send + Sync + 'static {
    /// Handlers attached to every player's transport for the whole game.
    fn events(&self) -> EventTable<SocketContext> {
        EventTable::new()
    }

    /// Register the phases of a freshly created game.
    fn setup(&self, game: &Arc<Game>) -> Result<(), PhaseError>;

    /// Called once a join fills the game, after `readyToPlay` went out.
    async fn on_ready(&self, _game: Arc<Game>) {}
}

/// Handler context for the coordinator's own control events.
pub struct ControlContext<D: GameDefinition> {
    coordinator: Weak<SessionCoordinator<D>>,
    transport: Weak<dyn Transport>,
}

impl<D: GameDefinition> Clone for ControlContext<D> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            transport: self.transport.clone(),
        }
    }
}

impl<D: GameDefinition> ControlContext<D> {
    fn upgrade(&self) -> Option<(Arc<SessionCoordinator<D>>, Arc<dyn Transport>)> {
        Some((self.coordinator.upgrade()?, self.transport.upgrade()?))
    }
}

/// Server authority over every game: creates them, admits players and
/// runs the disconnect/reconnect protocol.
pub struct SessionCoordinator<D: GameDefinition> {
    pub config: ServerConfig,
    definition: D,
    games: Mutex<HashMap<GameId, Arc<Game>>>,
    departures: Mutex<HashMap<PlayerId, JoinHandle<()>>>,
    control: Bindings<ControlContext<D>>,
    id_generator: Arc<dyn IdGenerator>,
    this: Weak<Self>,
}

impl<D: GameDefinition> SessionCoordinator<D> {
    pub fn new(config: ServerConfig, definition: D) -> Arc<Self> {
        Self::with_id_generator(config, definition, Arc::new(GlobalIdGenerator))
    }

    /// Coordinator drawing game and player ids from `id_generator`.
    pub fn with_id_generator(
        config: ServerConfig,
        definition: D,
        id_generator: Arc<dyn IdGenerator>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            definition,
            games: Mutex::new(HashMap::new()),
            departures: Mutex::new(HashMap::new()),
            control: Bindings::new(Self::control_events()),
            id_generator,
            this: this.clone(),
        })
    }

    pub fn definition(&self) -> &D {
        &self.definition
    }

    fn control_events() -> EventTable<ControlContext<D>> {
        EventTable::new()
            .on(ControlEvent::CreateGame.name(), |ctx: ControlContext<D>, payload| async move {
                if let Some((coordinator, transport)) = ctx.upgrade() {
                    coordinator.on_create_request(transport, payload).await;
                }
            })
            .on(ControlEvent::JoinGame.name(), |ctx: ControlContext<D>, payload| async move {
                if let Some((coordinator, transport)) = ctx.upgrade() {
                    coordinator.on_join_request(transport, payload).await;
                }
            })
            .on(ControlEvent::ReconnectToGame.name(), |ctx: ControlContext<D>, payload| async move {
                if let Some((coordinator, transport)) = ctx.upgrade() {
                    coordinator.on_reconnect_request(transport, payload);
                }
            })
            .on(DISCONNECT_EVENT, |ctx: ControlContext<D>, _| async move {
                if let Some((coordinator, transport)) = ctx.upgrade() {
                    coordinator.handle_disconnect(transport.id());
                }
            })
    }

    /// Take a freshly connected transport under control: bind the control
    /// events and greet it.
    pub fn accept(&self, transport: Arc<dyn Transport>) {
        self.watch(&transport);
        tracing::info!(transport = %transport.id(), "transport accepted");
        if let Err(err) = transport.emit(ControlEvent::Connection.name(), Value::Null) {
            tracing::debug!(%err, "transport closed before greeting");
        }
    }

    fn watch(&self, transport: &Arc<dyn Transport>) {
        let ctx = ControlContext {
            coordinator: self.this.clone(),
            transport: Arc::downgrade(transport),
        };
        self.control.attach(transport.as_ref(), ctx);
    }

    /// Create a game and, when a creator is given, join it as the first
    /// player. A game whose creator cannot join is ended right away.
    pub async fn create_game(
        &self,
        creator: Option<Arc<dyn Transport>>,
        metadata: Map<String, Value>,
    ) -> Result<Arc<Game>, CreateGameError> {
        let game = Game::new(
            self.id_generator.next_id(),
            self.config.max_players,
            self.definition.events(),
            Arc::clone(&self.id_generator),
        );
        self.definition.setup(&game)?;

        let coordinator = self.this.clone();
        game.on_end(move |game| {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.forget_game(game);
            }
        });

        {
            let mut games = lock(&self.games);
            if games.len() >= self.config.max_games {
                return Err(CreateGameError::TooManyGames);
            }
            games.insert(game.id().to_owned(), Arc::clone(&game));
        }
        tracing::info!(game_id = %game.id(), "game created");

        if !game.phases().phases().is_empty() {
            game.start(Vec::new()).await?;
        }

        if let Some(creator) = creator {
            if let Err(err) = self.join_game(creator, game.id(), metadata).await {
                game.end();
                return Err(CreateGameError::Join(err));
            }
        }

        Ok(game)
    }

    /// Admit `transport` into a game. Filling the game broadcasts the
    /// full roster; otherwise the others learn about the newcomer.
    pub async fn join_game(
        &self,
        transport: Arc<dyn Transport>,
        game_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<PlayerId, JoinError> {
        let game = self.game(game_id).ok_or(JoinError::GameNotFound)?;
        let (player, filled) = game.add_player(Arc::clone(&transport), metadata)?;
        self.watch(&transport);

        let ack = to_payload(&SessionIds {
            game_id: game.id().to_owned(),
            player_id: player.id().to_owned(),
        });
        if let Err(err) = transport.emit(ControlEvent::GameJoined.name(), ack) {
            tracing::debug!(%err, "joined transport already closed");
        }

        if filled {
            game.emit_to_all(ControlEvent::ReadyToPlay.name(), Value::Array(game.roster()));
            self.definition.on_ready(Arc::clone(&game)).await;
        } else {
            game.emit_to_others(
                player.id(),
                ControlEvent::NewPlayerJoined.name(),
                player.serialize(),
            );
        }

        Ok(player.id().to_owned())
    }

    /// Bind a returning player to `transport` and cancel its pending
    /// departure notice.
    pub fn reconnect(
        &self,
        transport: Arc<dyn Transport>,
        game_id: &str,
        player_id: &str,
    ) -> Result<(), ReconnectError> {
        let game = self.game(game_id).ok_or(ReconnectError::GameNotFound)?;
        game.replace_transport(player_id, Arc::clone(&transport))?;

        if let Some(departure) = lock(&self.departures).remove(player_id) {
            departure.abort();
        }
        self.watch(&transport);

        let ack = to_payload(&SessionIds {
            game_id: game_id.to_owned(),
            player_id: player_id.to_owned(),
        });
        if let Err(err) = transport.emit(ControlEvent::GameJoined.name(), ack) {
            tracing::debug!(%err, "reconnected transport already closed");
        }
        Ok(())
    }

    /// Warn the others that a player dropped, and tell them it left if it
    /// is still gone once the grace period runs out.
    pub fn handle_disconnect(&self, transport: TransportId) {
        self.control.forget(transport);

        let found = self
            .games()
            .into_iter()
            .find_map(|game| game.player_id_for(transport).map(|id| (game, id)));
        let Some((game, player_id)) = found else {
            tracing::debug!(%transport, "transport closed outside any game");
            return;
        };

        tracing::info!(game_id = %game.id(), player_id = %player_id, "player connection lost");
        let notice = to_payload(&PlayerNotice {
            player_id: player_id.clone(),
        });
        game.emit_to_others(
            &player_id,
            ControlEvent::PlayerConnectionDifficulties.name(),
            notice.clone(),
        );

        let grace = self.config.reconnect_grace_period;
        let weak_game = Arc::downgrade(&game);
        let leaving = player_id.clone();
        let departure = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let Some(game) = weak_game.upgrade() else {
                return;
            };
            let returned = game.player(&leaving).is_some_and(|p| p.is_connected());
            if game.is_ended() || returned {
                return;
            }
            tracing::info!(game_id = %game.id(), player_id = %leaving, "player left");
            game.emit_to_others(&leaving, ControlEvent::PlayerLeft.name(), notice);
        });

        if let Some(previous) = lock(&self.departures).insert(player_id, departure) {
            previous.abort();
        }
    }

    async fn on_create_request(&self, transport: Arc<dyn Transport>, payload: Value) {
        let request: CreateGameRequest = serde_json::from_value(payload).unwrap_or_default();
        if let Err(err) = self.create_game(Some(Arc::clone(&transport)), request.metadata).await {
            tracing::warn!(%err, "create request failed");
            let reason = match err {
                CreateGameError::Join(join) => join.reason().to_owned(),
                other => other.to_string(),
            };
            notify_join_error(transport.as_ref(), reason, None);
        }
    }

    async fn on_join_request(&self, transport: Arc<dyn Transport>, payload: Value) {
        let request: JoinGameRequest = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(%err, "malformed join request");
                notify_join_error(transport.as_ref(), JoinError::GameNotFound.reason().to_owned(), None);
                return;
            }
        };

        let game_id = request.game_id.clone();
        if let Err(err) = self
            .join_game(Arc::clone(&transport), &request.game_id, request.metadata)
            .await
        {
            tracing::info!(game_id = %game_id, %err, "join refused");
            notify_join_error(transport.as_ref(), err.reason().to_owned(), Some(game_id));
        }
    }

    fn on_reconnect_request(&self, transport: Arc<dyn Transport>, payload: Value) {
        let result = serde_json::from_value::<SessionIds>(payload)
            .map_err(|_| ReconnectError::GameNotFound)
            .and_then(|ids| self.reconnect(Arc::clone(&transport), &ids.game_id, &ids.player_id));

        if let Err(err) = result {
            tracing::info!(%err, "reconnect refused");
            if let Err(err) = transport.emit(ControlEvent::CantReconnect.name(), Value::Null) {
                tracing::debug!(%err, "transport closed before refusal");
            }
        }
    }

    fn forget_game(&self, game: &Game) {
        lock(&self.games).remove(game.id());
        let mut departures = lock(&self.departures);
        for player in game.players() {
            self.control.forget(player.transport().id());
            if let Some(departure) = departures.remove(player.id()) {
                departure.abort();
            }
        }
    }

    pub fn game(&self, game_id: &str) -> Option<Arc<Game>> {
        lock(&self.games).get(game_id).cloned()
    }

    pub fn games(&self) -> Vec<Arc<Game>> {
        lock(&self.games).values().cloned().collect()
    }

    /// List all games.
    pub fn list_games(&self) -> Vec<GameInfo> {
        self.games().iter().map(|game| game.info()).collect()
    }

    /// End a game. Returns false when no such game exists.
    pub fn end_game(&self, game_id: &str) -> bool {
        match self.game(game_id) {
            Some(game) => {
                game.end();
                true
            }
            None => false,
        }
    }

    /// End every game and cancel pending departure notices.
    pub fn shutdown(&self) {
        let games: Vec<_> = lock(&self.games).drain().map(|(_, game)| game).collect();
        for game in games {
            game.end();
        }
        for (_, departure) in lock(&self.departures).drain() {
            departure.abort();
        }
    }
}

fn notify_join_error(transport: &dyn Transport, reason: String, game_id: Option<GameId>) {
    let notice = to_payload(&JoinErrorNotice { reason, game_id });
    if let Err(err) = transport.emit(ControlEvent::JoinError.name(), notice) {
        tracing::debug!(%err, "transport closed before join error");
    }
}
