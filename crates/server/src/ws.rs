//! WebSocket binding: each socket on `/ws` becomes a [`WsTransport`]
//! accepted by the coordinator. Frames are JSON text `{"event", "data"}`.

use crate::server::{GameDefinition, SessionCoordinator};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use ludum_core::{EventEmitter, Transport, TransportError, TransportId, DISCONNECT_EVENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// One text frame on the socket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Server end of one WebSocket.
pub struct WsTransport {
    id: TransportId,
    connected: AtomicBool,
    events: EventEmitter,
    outbound: mpsc::UnboundedSender<Message>,
}

impl WsTransport {
    fn new(outbound: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: TransportId::next(),
            connected: AtomicBool::new(true),
            events: EventEmitter::new(),
            outbound,
        }
    }

    /// The peer went away: flag the transport and tell its listeners.
    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!(transport = %self.id, "transport closed");
        self.events.emit(DISCONNECT_EVENT, Value::Null).await;
    }
}

impl Transport for WsTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, event: &str, data: Value) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let frame = WireMessage {
            event: event.to_owned(),
            data,
        };
        let text = serde_json::to_string(&frame).map_err(|err| TransportError::Encode(err.to_string()))?;
        self.outbound
            .send(Message::Text(text.into()))
            .map_err(|_| TransportError::Disconnected)
    }

    fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.outbound.send(Message::Close(None));
        }
    }
}

pub fn router<D: GameDefinition>(coordinator: Arc<SessionCoordinator<D>>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::<D>))
        .with_state(coordinator)
}

/// Bind `addr` and serve the WebSocket endpoint until the listener fails.
pub async fn listen<D: GameDefinition>(
    coordinator: Arc<SessionCoordinator<D>>,
    addr: SocketAddr,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(coordinator, listener).await
}

/// Serve the WebSocket endpoint on an already bound listener.
pub async fn serve<D: GameDefinition>(
    coordinator: Arc<SessionCoordinator<D>>,
    listener: TcpListener,
) -> std::io::Result<()> {
    tracing::info!("listening on ws://{}/ws", listener.local_addr()?);
    axum::serve(listener, router(coordinator)).await
}

async fn ws_handler<D: GameDefinition>(
    ws: WebSocketUpgrade,
    State(coordinator): State<Arc<SessionCoordinator<D>>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(coordinator, socket))
}

async fn serve_socket<D: GameDefinition>(coordinator: Arc<SessionCoordinator<D>>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut frames) = mpsc::unbounded_channel::<Message>();
    let transport = Arc::new(WsTransport::new(outbound));

    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if sink.send(frame).await.is_err() || closing {
                break;
            }
        }
    });

    coordinator.accept(transport.clone());

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                dispatch_text(&transport, text.as_str()).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    transport.close().await;
    writer.abort();
}

/// Decode one text frame and emit it on the transport. Returns false for
/// a frame that is not a `{event, data}` object; it is dropped.
async fn dispatch_text(transport: &WsTransport, text: &str) -> bool {
    match serde_json::from_str::<WireMessage>(text) {
        Ok(frame) => {
            transport.events().emit(&frame.event, frame.data).await;
            true
        }
        Err(err) => {
            tracing::warn!(transport = %transport.id(), %err, "dropping malformed frame");
            false
        }
    }
}
