use crate::errors::{JoinError, ReconnectError};
use crate::player::Player;
use crate::roster::Roster;
use crate::types::{GameId, GameInfo, PlayerId};
use ludum_core::protocol::{to_payload, ControlEvent, SwitchPhase};
use ludum_core::sync::lock;
use ludum_core::{
    Bindings, EventTable, IdGenerator, NetworkPhase, PhaseArgs, PhaseBinder, PhaseError,
    PhaseMachine, Transport, TransportError, TransportId,
};
use rand::Rng;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Phase type hosted by a server game.
pub type GamePhase = dyn NetworkPhase<SocketContext>;

type EndCallback = Box<dyn FnOnce(&Game) + Send>;

/// What a network handler knows about where an event came from.
#[derive(Clone)]
pub struct SocketContext {
    game: Weak<Game>,
    transport: Weak<dyn Transport>,
}

impl SocketContext {
    pub fn game(&self) -> Option<Arc<Game>> {
        self.game.upgrade()
    }

    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.upgrade()
    }

    /// Id of the player currently bound to the originating transport.
    pub fn player_id(&self) -> Option<PlayerId> {
        let transport = self.transport()?;
        self.game()?.player_id_for(transport.id())
    }

    /// Emit back to the originating transport only.
    pub fn reply(&self, event: &str, data: Value) -> Result<(), TransportError> {
        self.transport()
            .ok_or(TransportError::Disconnected)?
            .emit(event, data)
    }
}

/// One server-side game: its players, phases and turn state.
///
/// Always handled as `Arc<Game>`. Roster mutations happen under a short
/// lock; transports are emitted to after the lock is released.
pub struct Game {
    id: GameId,
    max_players: usize,
    phases: PhaseMachine<GamePhase>,
    bindings: Bindings<SocketContext>,
    binder: PhaseBinder<SocketContext>,
    roster: Mutex<Roster>,
    on_end: Mutex<Vec<EndCallback>>,
    ended: AtomicBool,
    id_generator: Arc<dyn IdGenerator>,
    this: Weak<Game>,
}

impl Game {
    /// `events` are attached to every player's transport for the whole
    /// life of the game, independent of the current phase.
    pub fn new(
        id: GameId,
        max_players: usize,
        events: EventTable<SocketContext>,
        id_generator: Arc<dyn IdGenerator>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id,
            max_players,
            phases: PhaseMachine::headless(),
            bindings: Bindings::new(events),
            binder: PhaseBinder::new(),
            roster: Mutex::new(Roster::new()),
            on_end: Mutex::new(Vec::new()),
            ended: AtomicBool::new(false),
            id_generator,
            this: this.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    /// Weak handle for phases and handlers that need to reach back.
    pub fn downgrade(&self) -> Weak<Game> {
        self.this.clone()
    }

    pub fn info(&self) -> GameInfo {
        GameInfo {
            game_id: self.id.clone(),
            phase: self.phases.current_phase_id(),
            player_count: self.player_count(),
            max_players: self.max_players,
        }
    }

    // Phases

    pub fn phases(&self) -> &PhaseMachine<GamePhase> {
        &self.phases
    }

    pub fn register_phase(&self, phase: Arc<GamePhase>) -> Result<(), PhaseError> {
        self.phases.register(phase)
    }

    /// Go to the first registered phase.
    pub async fn start(&self, args: PhaseArgs) -> Result<(), PhaseError> {
        let first = self
            .phases
            .phases()
            .into_iter()
            .next()
            .ok_or(PhaseError::NoPhases)?;
        self.go_to_phase(first, args).await;
        Ok(())
    }

    /// Move every transport's handlers to `target`, then transition.
    /// Transitions run one at a time; do not call this from a phase
    /// callback of the same game.
    pub async fn go_to_phase(&self, target: Arc<GamePhase>, args: PhaseArgs) {
        self.binder
            .transition(&self.phases, target, args, || self.contexts())
            .await;
    }

    pub async fn go_to_phase_by_id(&self, id: &str, args: PhaseArgs) -> Result<(), PhaseError> {
        let target = self
            .phases
            .phase(id)
            .ok_or_else(|| PhaseError::UnknownPhase(id.to_owned()))?;
        self.go_to_phase(target, args).await;
        Ok(())
    }

    /// Tell every client to go to `phase_name`.
    pub fn emit_switch_phase(&self, phase_name: &str, data: PhaseArgs) {
        let payload = to_payload(&SwitchPhase {
            phase_name: phase_name.to_owned(),
            data,
        });
        self.emit_to_all(ControlEvent::SwitchPhase.name(), payload);
    }

    /// Transition locally, then tell the clients to follow.
    pub async fn switch_phase(&self, phase_name: &str, data: PhaseArgs) -> Result<(), PhaseError> {
        self.go_to_phase_by_id(phase_name, data.clone()).await?;
        self.emit_switch_phase(phase_name, data);
        Ok(())
    }

    // Players

    /// Admit a player. The capacity check and the insertion happen under
    /// one lock, so concurrent joins never overfill the game. The flag is
    /// true for the join that filled the game.
    pub fn add_player(
        &self,
        transport: Arc<dyn Transport>,
        metadata: Map<String, Value>,
    ) -> Result<(Player, bool), JoinError> {
        if self.is_ended() {
            return Err(JoinError::GameNotFound);
        }

        let (player, filled) = {
            let mut roster = lock(&self.roster);
            if roster.len() >= self.max_players {
                return Err(JoinError::GameFull);
            }
            let player = Player::new(self.id_generator.next_id(), Arc::clone(&transport), metadata);
            roster.push(player.clone());
            (player, roster.len() == self.max_players)
        };

        self.attach(&transport);
        tracing::info!(game_id = %self.id, player_id = %player.id(), "player joined");
        Ok((player, filled))
    }

    /// Bind a returning player to a new transport. The stale transport
    /// loses its handlers and is disconnected if still up.
    pub fn replace_transport(
        &self,
        player_id: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<(), ReconnectError> {
        let stale = {
            let mut roster = lock(&self.roster);
            let player = roster
                .get_mut(player_id)
                .ok_or(ReconnectError::PlayerNotFound)?;
            player.replace_transport(Arc::clone(&transport))
        };

        self.detach(stale.as_ref());
        self.attach(&transport);
        tracing::info!(game_id = %self.id, player_id, "player reconnected");
        Ok(())
    }

    pub fn player_count(&self) -> usize {
        lock(&self.roster).len()
    }

    pub fn is_full(&self) -> bool {
        self.player_count() >= self.max_players
    }

    pub fn player(&self, player_id: &str) -> Option<Player> {
        lock(&self.roster).get(player_id).cloned()
    }

    pub fn players(&self) -> Vec<Player> {
        lock(&self.roster).players().to_vec()
    }

    pub fn player_id_for(&self, transport: TransportId) -> Option<PlayerId> {
        lock(&self.roster)
            .find_by_transport(transport)
            .map(|p| p.id().to_owned())
    }

    /// Public records of every player, in join order.
    pub fn roster(&self) -> Vec<Value> {
        lock(&self.roster).serialize()
    }

    // Broadcast

    pub fn emit_to_all(&self, event: &str, data: Value) {
        for player in self.players() {
            send(&player, event, data.clone());
        }
    }

    pub fn emit_to_others(&self, except: &str, event: &str, data: Value) {
        for player in self.players().iter().filter(|p| p.id() != except) {
            send(player, event, data.clone());
        }
    }

    /// An unknown player is reported as [`TransportError::Disconnected`].
    pub fn emit_to_player(&self, player_id: &str, event: &str, data: Value) -> Result<(), TransportError> {
        self.player(player_id)
            .ok_or(TransportError::Disconnected)?
            .transport()
            .emit(event, data)
    }

    // Turns

    pub fn active_players(&self) -> Vec<PlayerId> {
        lock(&self.roster).active().to_vec()
    }

    /// Replace the active set and broadcast it, even when unchanged.
    pub fn set_active_players(&self, ids: Vec<PlayerId>) {
        lock(&self.roster).set_active(ids.clone());
        self.emit_to_all(ControlEvent::ActivePlayers.name(), to_payload(&ids));
    }

    pub fn set_active_player(&self, player_id: &str) {
        self.set_active_players(vec![player_id.to_owned()]);
    }

    /// Hand the turn to the next player, or a random one when nobody is
    /// active yet.
    pub fn advance_active_player(&self) -> Option<PlayerId> {
        self.advance_active_player_with(|len| rand::thread_rng().gen_range(0..len))
    }

    /// Like [`Game::advance_active_player`] with the random pick supplied
    /// by the caller.
    pub fn advance_active_player_with(&self, pick: impl FnOnce(usize) -> usize) -> Option<PlayerId> {
        let next = lock(&self.roster).next_active(pick)?;
        self.set_active_player(&next);
        Some(next)
    }

    // Lifecycle

    /// Register a callback run when the game ends, before its transports
    /// are severed.
    pub fn on_end(&self, callback: impl FnOnce(&Game) + Send + 'static) {
        lock(&self.on_end).push(Box::new(callback));
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Run the end callbacks, then strip and disconnect every transport
    /// and clear the roster. Later calls do nothing.
    pub fn end(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }

        let callbacks = std::mem::take(&mut *lock(&self.on_end));
        for callback in callbacks {
            callback(self);
        }

        let players = lock(&self.roster).take_players();
        let phases = self.phases.phases();
        for player in &players {
            let transport = player.transport();
            transport.events().remove_all_listeners();
            self.bindings.forget(transport.id());
            for phase in &phases {
                phase.bindings().forget(transport.id());
            }
            transport.disconnect();
        }

        tracing::info!(game_id = %self.id, players = players.len(), "game ended");
    }

    fn context(&self, transport: &Arc<dyn Transport>) -> SocketContext {
        SocketContext {
            game: self.this.clone(),
            transport: Arc::downgrade(transport),
        }
    }

    fn contexts(&self) -> Vec<(Arc<dyn Transport>, SocketContext)> {
        self.players()
            .iter()
            .map(|p| (Arc::clone(p.transport()), self.context(p.transport())))
            .collect()
    }

    fn attach(&self, transport: &Arc<dyn Transport>) {
        let ctx = self.context(transport);
        self.bindings.attach(transport.as_ref(), ctx.clone());
        self.binder.attach(transport.as_ref(), ctx);
    }

    /// Strip every phase's handlers, not only the bound one: a transport
    /// swapped out mid transition may still carry the outgoing phase's.
    fn detach(&self, transport: &dyn Transport) {
        self.bindings.detach(transport);
        for phase in self.phases.phases() {
            phase.bindings().detach(transport);
        }
    }
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("id", &self.id)
            .field("max_players", &self.max_players)
            .field("players", &self.player_count())
            .field("ended", &self.is_ended())
            .finish()
    }
}

fn send(player: &Player, event: &str, data: Value) {
    if let Err(err) = player.transport().emit(event, data) {
        tracing::debug!(player_id = %player.id(), event, %err, "dropping event for unreachable player");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ludum_core::{LocalTransport, OnlinePhase, Phase, SequentialIdGenerator};
    use std::time::Duration;

    struct Named(&'static str);

    #[async_trait]
    impl Phase for Named {
        fn id(&self) -> &str {
            self.0
        }
    }

    fn game(max_players: usize) -> Arc<Game> {
        Game::new(
            "g1".to_owned(),
            max_players,
            EventTable::new(),
            Arc::new(SequentialIdGenerator::new("p")),
        )
    }

    fn phase(id: &'static str, event: &str) -> Arc<GamePhase> {
        Arc::new(OnlinePhase::new(
            Named(id),
            EventTable::new().on(event, |_: SocketContext, _| async {}),
        ))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let game = game(1);
        let (first, _r1) = LocalTransport::pair();
        let (second, _r2) = LocalTransport::pair();

        let (player, filled) = game.add_player(first, Map::new()).unwrap();
        assert_eq!(player.id(), "p1");
        assert!(filled);

        assert_eq!(game.add_player(second, Map::new()).unwrap_err(), JoinError::GameFull);
        assert_eq!(game.player_count(), 1);
    }

    #[tokio::test]
    async fn test_transition_rebinds_every_transport() {
        let game = game(2);
        game.register_phase(phase("Lobby", "ready")).unwrap();
        game.register_phase(phase("Play", "move")).unwrap();
        let (first, _r1) = LocalTransport::pair();
        let (second, _r2) = LocalTransport::pair();
        game.add_player(first.clone(), Map::new()).unwrap();

        game.start(Vec::new()).await.unwrap();
        game.add_player(second.clone(), Map::new()).unwrap();
        assert_eq!(second.events().listener_count("ready"), 1);

        game.go_to_phase_by_id("Play", Vec::new()).await.unwrap();
        for transport in [&first, &second] {
            assert_eq!(transport.events().listener_count("ready"), 0);
            assert_eq!(transport.events().listener_count("move"), 1);
        }
        assert_eq!(game.info().phase.as_deref(), Some("Play"));
    }

    /// Takes a while to wind down, leaving a window mid transition.
    struct Lingering(&'static str);

    #[async_trait]
    impl Phase for Lingering {
        fn id(&self) -> &str {
            self.0
        }

        async fn on_end(&self) -> ludum_core::EndOutcome {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ludum_core::EndOutcome::Proceed
        }
    }

    fn lingering_game() -> Arc<Game> {
        let game = game(3);
        for (id, event) in [("Lobby", "ready"), ("Play", "move"), ("Results", "rematch")] {
            let events = EventTable::new().on(event, |_: SocketContext, _| async {});
            game.register_phase(Arc::new(OnlinePhase::new(Lingering(id), events)))
                .unwrap();
        }
        game
    }

    fn handler_counts(transport: &LocalTransport) -> [usize; 3] {
        ["ready", "move", "rematch"].map(|event| transport.events().listener_count(event))
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_transitions_bind_one_phase() {
        let game = lingering_game();
        let (transport, _remote) = LocalTransport::pair();
        game.add_player(transport.clone(), Map::new()).unwrap();
        game.start(Vec::new()).await.unwrap();

        let first = {
            let game = Arc::clone(&game);
            tokio::spawn(async move { game.go_to_phase_by_id("Play", Vec::new()).await })
        };
        settle().await;
        game.go_to_phase_by_id("Results", Vec::new()).await.unwrap();
        first.await.unwrap().unwrap();

        assert_eq!(game.phases().current_phase_id().as_deref(), Some("Results"));
        assert_eq!(handler_counts(&transport), [0, 0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_during_transition_follows_incoming_phase() {
        let game = lingering_game();
        let (host, _r1) = LocalTransport::pair();
        let (joiner, _r2) = LocalTransport::pair();
        game.add_player(host.clone(), Map::new()).unwrap();
        game.start(Vec::new()).await.unwrap();

        let transition = {
            let game = Arc::clone(&game);
            tokio::spawn(async move { game.go_to_phase_by_id("Play", Vec::new()).await })
        };
        settle().await;
        assert_eq!(game.phases().current_phase_id().as_deref(), Some("Lobby"));
        game.add_player(joiner.clone(), Map::new()).unwrap();
        assert_eq!(handler_counts(&joiner), [0, 1, 0]);
        transition.await.unwrap().unwrap();

        game.go_to_phase_by_id("Results", Vec::new()).await.unwrap();
        for transport in [&host, &joiner] {
            assert_eq!(handler_counts(transport), [0, 0, 1]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_transport_loses_every_phase_handler() {
        let game = lingering_game();
        let (old, _r1) = LocalTransport::pair();
        let (new, _r2) = LocalTransport::pair();
        let (player, _) = game.add_player(old.clone(), Map::new()).unwrap();
        game.start(Vec::new()).await.unwrap();

        game.replace_transport(player.id(), new.clone()).unwrap();

        assert_eq!(handler_counts(&old), [0, 0, 0]);
        assert_eq!(handler_counts(&new), [1, 0, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_active_players_always_broadcasts() {
        let game = game(2);
        let (transport, remote) = LocalTransport::pair();
        game.add_player(transport, Map::new()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        remote.events().on(
            ControlEvent::ActivePlayers.name(),
            ludum_core::sync_listener(move |ids| lock(&sink).push(ids)),
        );

        game.set_active_player("p1");
        game.set_active_player("p1");
        settle().await;

        assert_eq!(lock(&seen).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_severs_transports_once() {
        let game = game(2);
        let (transport, remote) = LocalTransport::pair();
        game.add_player(transport.clone(), Map::new()).unwrap();
        let ended = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ended);
        game.on_end(move |game| lock(&sink).push(game.player_count()));

        game.end();
        game.end();
        settle().await;

        assert_eq!(*lock(&ended), vec![1]);
        assert!(game.is_ended());
        assert_eq!(game.player_count(), 0);
        assert!(!remote.is_connected());
        assert_eq!(transport.events().listener_count(ludum_core::DISCONNECT_EVENT), 0);
    }
}
