//! Client side of the server-authoritative phase machine.

use crate::store::SessionStore;
use ludum_core::protocol::{to_payload, ControlEvent, CreateGameRequest, JoinGameRequest, SessionIds, SwitchPhase};
use ludum_core::sync::lock;
use ludum_core::{
    ActivationEvent, Bindings, EventTable, HeadlessSurface, NetworkPhase, PhaseArgs, PhaseBinder,
    PhaseError, PhaseMachine, Surface, Transport, TransportError,
};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, Weak};

/// Phase type hosted by an [`OnlineGame`].
pub type ClientPhase = dyn NetworkPhase<ClientContext>;

/// Handler context on the client: the game and the server transport.
#[derive(Clone)]
pub struct ClientContext {
    game: Weak<OnlineGame>,
    transport: Weak<dyn Transport>,
}

impl ClientContext {
    pub fn game(&self) -> Option<Arc<OnlineGame>> {
        self.game.upgrade()
    }

    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.upgrade()
    }

    pub fn emit(&self, event: &str, data: Value) -> Result<(), TransportError> {
        self.transport()
            .ok_or(TransportError::Disconnected)?
            .emit(event, data)
    }
}

/// A game whose phase changes are driven by the server's `switchPhase`
/// messages.
pub struct OnlineGame {
    phases: PhaseMachine<ClientPhase>,
    control: Bindings<ClientContext>,
    bindings: Bindings<ClientContext>,
    binder: PhaseBinder<ClientContext>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    store: Arc<dyn SessionStore>,
    this: Weak<OnlineGame>,
}

impl OnlineGame {
    /// `events` stay attached to the server transport whatever the
    /// current phase, next to the built-in control handlers.
    pub fn new(
        surface: Arc<dyn Surface>,
        activation: ActivationEvent,
        store: Arc<dyn SessionStore>,
        events: EventTable<ClientContext>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            phases: PhaseMachine::new(surface, activation),
            control: Bindings::new(control_events()),
            bindings: Bindings::new(events),
            binder: PhaseBinder::new(),
            transport: Mutex::new(None),
            store,
            this: this.clone(),
        })
    }

    pub fn headless(store: Arc<dyn SessionStore>) -> Arc<Self> {
        Self::new(
            Arc::new(HeadlessSurface::new()),
            ActivationEvent::Click,
            store,
            EventTable::new(),
        )
    }

    pub fn phases(&self) -> &PhaseMachine<ClientPhase> {
        &self.phases
    }

    pub fn register_phase(&self, phase: Arc<ClientPhase>) -> Result<(), PhaseError> {
        self.phases.register(phase)
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        lock(&self.transport).clone()
    }

    /// Talk to the server through `transport`. When the store remembers a
    /// previous session, ask to be reconnected to it and return true.
    pub fn connect(&self, transport: Arc<dyn Transport>) -> bool {
        let previous = lock(&self.transport).replace(Arc::clone(&transport));
        if let Some(previous) = previous {
            self.detach(previous.as_ref());
        }
        self.attach(&transport);

        let Some(ids) = self.store.session() else {
            return false;
        };
        tracing::info!(game_id = %ids.game_id, player_id = %ids.player_id, "resuming session");
        if let Err(err) = transport.emit(ControlEvent::ReconnectToGame.name(), to_payload(&ids)) {
            tracing::warn!(%err, "could not request reconnection");
            return false;
        }
        true
    }

    pub fn emit(&self, event: &str, data: Value) -> Result<(), TransportError> {
        self.transport()
            .ok_or(TransportError::Disconnected)?
            .emit(event, data)
    }

    pub fn create_game(&self, metadata: Map<String, Value>) -> Result<(), TransportError> {
        self.emit(
            ControlEvent::CreateGame.name(),
            to_payload(&CreateGameRequest { metadata }),
        )
    }

    pub fn join_game(&self, game_id: &str, metadata: Map<String, Value>) -> Result<(), TransportError> {
        let request = JoinGameRequest {
            game_id: game_id.to_owned(),
            metadata,
        };
        self.emit(ControlEvent::JoinGame.name(), to_payload(&request))
    }

    /// Game and player ids of the current session, if joined.
    pub fn session(&self) -> Option<SessionIds> {
        self.store.session()
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

    /// Move the server transport's handlers to `target`, then transition.
    /// A `switchPhase` arriving mid transition waits for it to finish.
    pub async fn go_to_phase(&self, target: Arc<ClientPhase>, args: PhaseArgs) {
        let transports = || -> Vec<(Arc<dyn Transport>, ClientContext)> {
            self.transport()
                .map(|t| {
                    let ctx = self.context(&t);
                    (t, ctx)
                })
                .into_iter()
                .collect()
        };
        self.binder
            .transition(&self.phases, target, args, transports)
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

    pub fn disconnect(&self) {
        if let Some(transport) = lock(&self.transport).take() {
            self.detach(transport.as_ref());
            transport.disconnect();
        }
    }

    fn context(&self, transport: &Arc<dyn Transport>) -> ClientContext {
        ClientContext {
            game: self.this.clone(),
            transport: Arc::downgrade(transport),
        }
    }

    fn attach(&self, transport: &Arc<dyn Transport>) {
        let ctx = self.context(transport);
        self.control.attach(transport.as_ref(), ctx.clone());
        self.bindings.attach(transport.as_ref(), ctx.clone());
        self.binder.attach(transport.as_ref(), ctx);
    }

    fn detach(&self, transport: &dyn Transport) {
        self.control.detach(transport);
        self.bindings.detach(transport);
        for phase in self.phases.phases() {
            phase.bindings().detach(transport);
        }
    }
}

fn control_events() -> EventTable<ClientContext> {
    EventTable::new()
        .on(ControlEvent::SwitchPhase.name(), |ctx: ClientContext, payload| async move {
            let Some(game) = ctx.game() else {
                return;
            };
            let switch: SwitchPhase = match serde_json::from_value(payload) {
                Ok(switch) => switch,
                Err(err) => {
                    tracing::warn!(%err, "malformed switchPhase");
                    return;
                }
            };
            if let Err(err) = game.go_to_phase_by_id(&switch.phase_name, switch.data).await {
                tracing::warn!(%err, "server switched to a phase this client lacks");
            }
        })
        .on(ControlEvent::GameJoined.name(), |ctx: ClientContext, payload| async move {
            let Some(game) = ctx.game() else {
                return;
            };
            match serde_json::from_value::<SessionIds>(payload) {
                Ok(ids) => {
                    tracing::info!(game_id = %ids.game_id, player_id = %ids.player_id, "joined game");
                    game.store.save_session(&ids);
                }
                Err(err) => tracing::warn!(%err, "malformed gameJoined"),
            }
        })
        .on(ControlEvent::CantReconnect.name(), |ctx: ClientContext, _| async move {
            if let Some(game) = ctx.game() {
                tracing::info!("previous session is gone");
                game.store.clear_session();
            }
        })
}
