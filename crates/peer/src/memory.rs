//! In-process signaling hub and data channels, for tests and demos.

use crate::connection::{ConnectOptions, Connection, CLOSE_EVENT, DATA_EVENT, OPEN_EVENT};
use crate::errors::PeerError;
use crate::signaling::{IncomingConnection, SignalEvent, Signaling};
use async_trait::async_trait;
use ludum_core::sync::lock;
use ludum_core::{EventEmitter, TransportId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, oneshot};

enum Frame {
    Data(Value),
    Close,
}

/// One end of an in-process data channel.
pub struct MemoryConnection {
    id: TransportId,
    peer: String,
    options: ConnectOptions,
    open: AtomicBool,
    events: EventEmitter,
    outbound: mpsc::UnboundedSender<Frame>,
}

impl MemoryConnection {
    /// Two unopened ends: the first talks to `remote`, the second to
    /// `local`. Must be called inside a tokio runtime.
    pub fn pair(local: &str, remote: &str, options: ConnectOptions) -> (Arc<Self>, Arc<Self>) {
        let (near_tx, near_rx) = mpsc::unbounded_channel();
        let (far_tx, far_rx) = mpsc::unbounded_channel();

        let near = Arc::new(Self {
            id: TransportId::next(),
            peer: remote.to_owned(),
            options: options.clone(),
            open: AtomicBool::new(false),
            events: EventEmitter::new(),
            outbound: near_tx,
        });
        let far = Arc::new(Self {
            id: TransportId::next(),
            peer: local.to_owned(),
            options,
            open: AtomicBool::new(false),
            events: EventEmitter::new(),
            outbound: far_tx,
        });

        tokio::spawn(pump(near_rx, Arc::downgrade(&far), Arc::downgrade(&near)));
        tokio::spawn(pump(far_rx, Arc::downgrade(&near), Arc::downgrade(&far)));

        (near, far)
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Flag the end as open and fire its open event. Idempotent.
    pub async fn mark_open(&self) {
        if !self.open.swap(true, Ordering::SeqCst) {
            self.events.emit(OPEN_EVENT, Value::Null).await;
        }
    }
}

async fn pump(
    mut frames: mpsc::UnboundedReceiver<Frame>,
    receiver: Weak<MemoryConnection>,
    sender: Weak<MemoryConnection>,
) {
    while let Some(frame) = frames.recv().await {
        match frame {
            Frame::Data(data) => {
                let Some(receiver) = receiver.upgrade() else {
                    break;
                };
                receiver.events.emit(DATA_EVENT, data).await;
            }
            Frame::Close => {
                for end in [&sender, &receiver] {
                    if let Some(end) = end.upgrade() {
                        end.open.store(false, Ordering::SeqCst);
                        end.events.emit(CLOSE_EVENT, Value::Null).await;
                    }
                }
                break;
            }
        }
    }
}

impl Connection for MemoryConnection {
    fn id(&self) -> TransportId {
        self.id
    }

    fn peer(&self) -> &str {
        &self.peer
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send(&self, data: Value) -> Result<(), PeerError> {
        if !self.is_open() {
            return Err(PeerError::NotOpen);
        }
        self.outbound
            .send(Frame::Data(data))
            .map_err(|_| PeerError::Closed)
    }

    fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.outbound.send(Frame::Close);
        }
    }
}

/// Directory of in-process peers.
#[derive(Default)]
pub struct MemoryHub {
    peers: Mutex<HashMap<String, Weak<MemoryPeer>>>,
    next_id: AtomicU64,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a peer with a generated id.
    pub fn create_peer(self: &Arc<Self>) -> Arc<MemoryPeer> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.create_peer_with_id(&format!("peer-{}", n))
    }

    pub fn create_peer_with_id(self: &Arc<Self>, id: &str) -> Arc<MemoryPeer> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let peer = Arc::new(MemoryPeer {
            id: id.to_owned(),
            hub: Arc::downgrade(self),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            reconnects: AtomicUsize::new(0),
        });
        lock(&self.peers).insert(id.to_owned(), Arc::downgrade(&peer));
        peer
    }

    fn lookup(&self, id: &str) -> Option<Arc<MemoryPeer>> {
        lock(&self.peers).get(id).and_then(Weak::upgrade)
    }
}

/// A peer registered on a [`MemoryHub`].
pub struct MemoryPeer {
    id: String,
    hub: Weak<MemoryHub>,
    events_tx: mpsc::UnboundedSender<SignalEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SignalEvent>>>,
    reconnects: AtomicUsize,
}

impl MemoryPeer {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Simulate losing the signaling server.
    pub fn drop_signaling(&self) {
        let _ = self.events_tx.send(SignalEvent::Disconnected);
    }

    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signaling for MemoryPeer {
    async fn peer_id(&self) -> String {
        self.id.clone()
    }

    fn connect(&self, remote: &str, options: ConnectOptions) -> Arc<dyn Connection> {
        let (near, far) = MemoryConnection::pair(&self.id, remote, options);

        let Some(target) = self.hub.upgrade().and_then(|hub| hub.lookup(remote)) else {
            tracing::warn!(peer = %self.id, remote, "no such peer, connection will never open");
            return near;
        };

        let (answer_tx, answer_rx) = oneshot::channel();
        let incoming = IncomingConnection::new(far.clone(), Some(answer_tx));
        if target.events_tx.send(SignalEvent::Connection(incoming)).is_err() {
            return near;
        }

        let opener = Arc::clone(&near);
        tokio::spawn(async move {
            let _ = answer_rx.await;
            far.mark_open().await;
            opener.mark_open().await;
        });
        near
    }

    fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        tracing::info!(peer = %self.id, "signaling reconnected");
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SignalEvent>> {
        lock(&self.events_rx).take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ludum_core::sync_listener;
    use serde_json::json;
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_opens_after_answer() {
        let hub = MemoryHub::new();
        let alice = hub.create_peer_with_id("alice");
        let bob = hub.create_peer_with_id("bob");
        let mut bob_events = bob.take_events().unwrap();

        let conn = alice.connect("bob", ConnectOptions::default());
        settle().await;
        assert!(!conn.is_open());

        let Some(SignalEvent::Connection(incoming)) = bob_events.recv().await else {
            panic!("expected an incoming connection");
        };
        assert_eq!(incoming.connection().peer(), "alice");
        let far = incoming.accept();
        settle().await;

        assert!(conn.is_open());
        assert!(far.is_open());
        assert_eq!(conn.peer(), "bob");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_reaches_both_ends() {
        let (near, far) = MemoryConnection::pair("a", "b", ConnectOptions::default());
        far.mark_open().await;
        near.mark_open().await;
        let closed = Arc::new(Mutex::new(0));
        for end in [&near, &far] {
            let closed = Arc::clone(&closed);
            end.events()
                .on(CLOSE_EVENT, sync_listener(move |_| *lock(&closed) += 1));
        }

        far.close();
        settle().await;

        assert_eq!(*lock(&closed), 2);
        assert!(!near.is_open());
        assert_eq!(near.send(json!(1)), Err(PeerError::NotOpen));
    }

    #[tokio::test]
    async fn test_unknown_remote_never_opens() {
        let hub = MemoryHub::new();
        let alice = hub.create_peer();

        let conn = alice.connect("nobody", ConnectOptions::default());

        assert!(!conn.is_open());
        assert_eq!(alice.id(), "peer-1");
    }
}
