use crate::connection::{
    send_when_open, wait_open, ConnectOptions, Connection, CLOSE_EVENT, DATA_EVENT,
};
use crate::envelope::{correlation_id, Envelope, MessageType};
use crate::errors::PeerError;
use crate::phase::PeerPhase;
use crate::signaling::{SignalEvent, Signaling};
use crate::types::{PeerConfig, PeerResponse};
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use ludum_core::sync::lock;
use ludum_core::{
    sync_listener, ActivationEvent, HeadlessSurface, ListenerId, PhaseArgs, PhaseError, PhaseMachine,
    Surface, TransportId,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use tokio::sync::{broadcast, mpsc, oneshot};

/// A game whose players talk to each other directly over peer
/// connections, with no server in between.
pub struct PeerGame {
    phases: PhaseMachine<dyn PeerPhase>,
    signaling: Arc<dyn Signaling>,
    connections: Mutex<Vec<Arc<dyn Connection>>>,
    incoming: broadcast::Sender<Arc<dyn Connection>>,
    config: PeerConfig,
    this: Weak<PeerGame>,
}

impl PeerGame {
    /// Headless game. Must be called inside a tokio runtime: it starts
    /// listening to the signaling events right away.
    pub fn new(signaling: Arc<dyn Signaling>, config: PeerConfig) -> Arc<Self> {
        Self::with_surface(
            Arc::new(HeadlessSurface::new()),
            ActivationEvent::Click,
            signaling,
            config,
        )
    }

    pub fn with_surface(
        surface: Arc<dyn Surface>,
        activation: ActivationEvent,
        signaling: Arc<dyn Signaling>,
        config: PeerConfig,
    ) -> Arc<Self> {
        let (incoming, _) = broadcast::channel(16);
        let events = signaling.take_events();
        let game = Arc::new_cyclic(|this| Self {
            phases: PhaseMachine::new(surface, activation),
            signaling,
            connections: Mutex::new(Vec::new()),
            incoming,
            config,
            this: this.clone(),
        });

        match events {
            Some(events) => {
                tokio::spawn(run_signaling(Arc::downgrade(&game), events));
            }
            None => tracing::warn!("signaling events already taken, inbound connections are ignored"),
        }
        game
    }

    pub fn phases(&self) -> &PhaseMachine<dyn PeerPhase> {
        &self.phases
    }

    pub fn register_phase(&self, phase: Arc<dyn PeerPhase>) -> Result<(), PhaseError> {
        self.phases.register(phase)
    }

    pub async fn start(&self, args: PhaseArgs) -> Result<(), PhaseError> {
        self.phases.start(args).await
    }

    pub async fn go_to_phase_by_id(&self, id: &str, args: PhaseArgs) -> Result<(), PhaseError> {
        self.phases.go_to_by_id(id, args).await
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub async fn peer_id(&self) -> String {
        self.signaling.peer_id().await
    }

    pub fn connections(&self) -> Vec<Arc<dyn Connection>> {
        lock(&self.connections).clone()
    }

    /// First live connection.
    pub fn connection(&self) -> Option<Arc<dyn Connection>> {
        lock(&self.connections).first().cloned()
    }

    /// Track a connection: route its requests to the current phase and
    /// forget it once it closes.
    pub fn add_connection(&self, connection: Arc<dyn Connection>) {
        let weak_game = self.this.clone();
        let weak_conn = Arc::downgrade(&connection);
        connection.events().on(
            DATA_EVENT,
            sync_listener(move |payload| {
                let (Some(game), Some(conn)) = (weak_game.upgrade(), weak_conn.upgrade()) else {
                    return;
                };
                tokio::spawn(async move { game.handle_inbound(conn, payload).await });
            }),
        );

        let weak_game = self.this.clone();
        let id = connection.id();
        connection.events().once(
            CLOSE_EVENT,
            sync_listener(move |_| {
                if let Some(game) = weak_game.upgrade() {
                    game.remove_connection(id);
                }
            }),
        );

        tracing::debug!(peer = %connection.peer(), "connection added");
        lock(&self.connections).push(connection);
    }

    fn remove_connection(&self, id: TransportId) {
        lock(&self.connections).retain(|c| c.id() != id);
        tracing::debug!(connection = %id, "connection removed");
    }

    /// Next inbound connection, once open.
    pub async fn wait_for_connection(&self) -> Result<Arc<dyn Connection>, PeerError> {
        let mut incoming = self.incoming.subscribe();
        let connection = incoming.recv().await.map_err(|_| PeerError::NoConnection)?;
        wait_open(&connection).await;
        Ok(connection)
    }

    /// Open a connection to `remote` and resolve once it is open.
    pub async fn connect(&self, remote: &str, options: ConnectOptions) -> Arc<dyn Connection> {
        let connection = self.signaling.connect(remote, options);
        self.add_connection(Arc::clone(&connection));
        wait_open(&connection).await;
        tracing::info!(remote, "connected to peer");
        connection
    }

    /// [`PeerGame::connect`] with JSON serialization.
    pub async fn connect_to_peer(&self, remote: &str) -> Arc<dyn Connection> {
        self.connect(remote, ConnectOptions::default()).await
    }

    /// Send a request and get a future for its reply. The request goes
    /// out before this returns, or on the open event if the connection
    /// is not open yet.
    pub fn send_to_connection(
        &self,
        connection: &Arc<dyn Connection>,
        data: Value,
    ) -> BoxFuture<'static, Result<PeerResponse, PeerError>> {
        let request_id = correlation_id();
        let (tx, rx) = oneshot::channel();
        let pending = Arc::new(PendingReply {
            slot: Mutex::new(Some(tx)),
            listener: OnceLock::new(),
        });

        let id = {
            let pending = Arc::clone(&pending);
            let request_id = request_id.clone();
            let weak_conn = Arc::downgrade(connection);
            connection.events().on(
                DATA_EVENT,
                sync_listener(move |payload| {
                    let Some(envelope) = Envelope::from_value(payload) else {
                        return;
                    };
                    if !envelope.is_reply_to(&request_id) {
                        return;
                    }
                    if let Some(tx) = lock(&pending.slot).take() {
                        let _ = tx.send(envelope.data);
                    }
                    if let Some(conn) = weak_conn.upgrade() {
                        pending.release(conn.as_ref());
                    }
                }),
            )
        };
        let _ = pending.listener.set(id);

        let transmitted = send_when_open(connection, Envelope::request(&request_id, data).to_value());
        let connection = Arc::clone(connection);
        let timeout = self.config.request_timeout;

        async move {
            if let Err(err) = transmitted {
                pending.release(connection.as_ref());
                return Err(err);
            }

            let reply = match timeout {
                None => rx.await,
                Some(limit) => match tokio::time::timeout(limit, rx).await {
                    Ok(reply) => reply,
                    Err(_) => {
                        pending.release(connection.as_ref());
                        tracing::debug!(peer = %connection.peer(), %request_id, "request timed out");
                        return Err(PeerError::Timeout);
                    }
                },
            };

            let value = reply.map_err(|_| PeerError::Closed)?;
            Ok(PeerResponse { connection, value })
        }
        .boxed()
    }

    /// Send the same request on every connection; replies come back in
    /// the order of `connections`.
    pub async fn send_to_connections(
        &self,
        connections: &[Arc<dyn Connection>],
        data: Value,
    ) -> Result<Vec<PeerResponse>, PeerError> {
        let requests: Vec<_> = connections
            .iter()
            .map(|connection| self.send_to_connection(connection, data.clone()))
            .collect();
        try_join_all(requests).await
    }

    /// Request on the first connection.
    pub async fn send(&self, data: Value) -> Result<PeerResponse, PeerError> {
        let connection = self.connection().ok_or(PeerError::NoConnection)?;
        self.send_to_connection(&connection, data).await
    }

    /// Request on every connection to `remote`.
    pub async fn send_to_peer(&self, remote: &str, data: Value) -> Result<Vec<PeerResponse>, PeerError> {
        let connections: Vec<_> = self
            .connections()
            .into_iter()
            .filter(|c| c.peer() == remote)
            .collect();
        self.send_to_connections(&connections, data).await
    }

    pub async fn send_to_all_peers(&self, data: Value) -> Result<Vec<PeerResponse>, PeerError> {
        let connections = self.connections();
        self.send_to_connections(&connections, data).await
    }

    pub fn reply_to_connection(
        &self,
        connection: &dyn Connection,
        request_id: &str,
        value: Value,
    ) -> Result<(), PeerError> {
        connection.send(Envelope::reply(request_id, value).to_value())
    }

    async fn handle_inbound(&self, connection: Arc<dyn Connection>, payload: Value) {
        let Some(envelope) = Envelope::from_value(payload) else {
            tracing::debug!(peer = %connection.peer(), "dropping message without envelope");
            return;
        };
        if envelope.metadata.kind == MessageType::Reply {
            return;
        }
        let Some(request_id) = envelope.request_id().map(str::to_owned) else {
            tracing::warn!(peer = %connection.peer(), "request without id");
            return;
        };

        let Some(phase) = self.phases.current_phase() else {
            tracing::debug!(peer = %connection.peer(), "request before any phase, dropping");
            return;
        };
        if !phase.handles_peer_messages() {
            tracing::debug!(phase = %phase.id(), "phase ignores peer messages");
            return;
        }

        let value = phase.on_peer_message(envelope.data, Arc::clone(&connection)).await;
        if let Err(err) = self.reply_to_connection(connection.as_ref(), &request_id, value) {
            tracing::warn!(peer = %connection.peer(), %err, "reply not sent");
        }
    }

    fn on_signal(&self, event: SignalEvent) {
        match event {
            SignalEvent::Connection(incoming) => {
                let connection = Arc::clone(incoming.connection());
                tracing::info!(peer = %connection.peer(), "incoming connection");
                self.add_connection(Arc::clone(&connection));
                incoming.accept();
                let _ = self.incoming.send(connection);
            }
            SignalEvent::Disconnected => {
                tracing::info!("signaling link lost, reconnecting");
                self.signaling.reconnect();
            }
        }
    }
}

/// Bookkeeping for one in-flight request.
struct PendingReply {
    slot: Mutex<Option<oneshot::Sender<Value>>>,
    listener: OnceLock<ListenerId>,
}

impl PendingReply {
    fn release(&self, connection: &dyn Connection) {
        if let Some(id) = self.listener.get() {
            connection.events().remove_listener(DATA_EVENT, *id);
        }
    }
}

async fn run_signaling(game: Weak<PeerGame>, mut events: mpsc::UnboundedReceiver<SignalEvent>) {
    while let Some(event) = events.recv().await {
        let Some(game) = game.upgrade() else {
            break;
        };
        game.on_signal(event);
    }
}
