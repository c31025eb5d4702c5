use crate::emitter::EventEmitter;
use crate::errors::TransportError;
use crate::types::TransportId;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// Event emitted locally on both ends when a transport closes.
pub const DISCONNECT_EVENT: &str = "disconnect";

/// A bidirectional, event-oriented channel to one remote endpoint.
///
/// Inbound events are delivered through [`Transport::events`]; outbound
/// events go through [`Transport::emit`].
pub trait Transport: Send + Sync {
    fn id(&self) -> TransportId;

    fn is_connected(&self) -> bool;

    fn emit(&self, event: &str, data: Value) -> Result<(), TransportError>;

    fn events(&self) -> &EventEmitter;

    /// Close the channel. Both ends observe [`DISCONNECT_EVENT`].
    fn disconnect(&self);
}

enum Frame {
    Event(String, Value),
    Close,
}

/// One end of an in-process transport pair.
///
/// Frames travel through an unbounded channel and are dispatched by a
/// pump task, so each direction preserves send order.
pub struct LocalTransport {
    id: TransportId,
    connected: Arc<AtomicBool>,
    events: EventEmitter,
    outbound: mpsc::UnboundedSender<Frame>,
}

impl LocalTransport {
    /// Create two connected ends. Must be called inside a tokio runtime.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let connected = Arc::new(AtomicBool::new(true));
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();

        let left = Arc::new(Self {
            id: TransportId::next(),
            connected: Arc::clone(&connected),
            events: EventEmitter::new(),
            outbound: left_tx,
        });
        let right = Arc::new(Self {
            id: TransportId::next(),
            connected,
            events: EventEmitter::new(),
            outbound: right_tx,
        });

        tokio::spawn(pump(left_rx, Arc::downgrade(&right), Arc::downgrade(&left)));
        tokio::spawn(pump(right_rx, Arc::downgrade(&left), Arc::downgrade(&right)));

        (left, right)
    }
}

async fn pump(
    mut frames: mpsc::UnboundedReceiver<Frame>,
    receiver: Weak<LocalTransport>,
    sender: Weak<LocalTransport>,
) {
    while let Some(frame) = frames.recv().await {
        match frame {
            Frame::Event(event, data) => {
                let Some(receiver) = receiver.upgrade() else {
                    break;
                };
                receiver.events.emit(&event, data).await;
            }
            Frame::Close => {
                for end in [&sender, &receiver] {
                    if let Some(end) = end.upgrade() {
                        end.events.emit(DISCONNECT_EVENT, Value::Null).await;
                    }
                }
                break;
            }
        }
    }
}

impl Transport for LocalTransport {
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
        self.outbound
            .send(Frame::Event(event.to_owned(), data))
            .map_err(|_| TransportError::Disconnected)
    }

    fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.outbound.send(Frame::Close);
        }
    }
}
