use crate::errors::PeerError;
use ludum_core::sync::lock;
use ludum_core::{sync_listener, EventEmitter, TransportId};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Emitted once the connection can carry data.
pub const OPEN_EVENT: &str = "open";
/// Emitted for every inbound message.
pub const DATA_EVENT: &str = "data";
/// Emitted when either side closes.
pub const CLOSE_EVENT: &str = "close";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Serialization {
    #[default]
    Json,
    Binary,
    None,
}

/// Options for opening a connection to a peer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectOptions {
    pub label: Option<String>,
    pub serialization: Serialization,
    pub reliable: bool,
    pub metadata: Option<Value>,
}

/// Bidirectional data channel to one remote peer. It may not be open yet
/// when handed out.
pub trait Connection: Send + Sync {
    fn id(&self) -> TransportId;

    /// Id of the remote peer.
    fn peer(&self) -> &str;

    fn is_open(&self) -> bool;

    fn send(&self, data: Value) -> Result<(), PeerError>;

    fn events(&self) -> &EventEmitter;

    fn close(&self);
}

/// Resolve once `connection` is open.
pub async fn wait_open(connection: &Arc<dyn Connection>) {
    let (tx, rx) = oneshot::channel();
    let slot = Mutex::new(Some(tx));
    let id = connection.events().once(
        OPEN_EVENT,
        sync_listener(move |_| {
            if let Some(tx) = lock(&slot).take() {
                let _ = tx.send(());
            }
        }),
    );

    if connection.is_open() {
        connection.events().remove_listener(OPEN_EVENT, id);
        return;
    }
    let _ = rx.await;
}

/// Transmit `data` now if the connection is open, otherwise as soon as it
/// opens. Exactly one transmission happens either way.
pub fn send_when_open(connection: &Arc<dyn Connection>, data: Value) -> Result<(), PeerError> {
    let sent = Arc::new(AtomicBool::new(false));
    let deferred = {
        let sent = Arc::clone(&sent);
        let target = Arc::downgrade(connection);
        let data = data.clone();
        sync_listener(move |_| {
            if sent.swap(true, Ordering::SeqCst) {
                return;
            }
            if let Some(target) = target.upgrade() {
                if let Err(err) = target.send(data.clone()) {
                    tracing::warn!(peer = %target.peer(), %err, "deferred send failed");
                }
            }
        })
    };
    let id = connection.events().once(OPEN_EVENT, deferred);

    if connection.is_open() && !sent.swap(true, Ordering::SeqCst) {
        connection.events().remove_listener(OPEN_EVENT, id);
        return connection.send(data);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnection;
    use ludum_core::sync_listener;
    use serde_json::json;
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn recorder(connection: &Arc<MemoryConnection>) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        connection
            .events()
            .on(DATA_EVENT, sync_listener(move |data| lock(&sink).push(data)));
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_waits_for_open() {
        let (local, remote) = MemoryConnection::pair("a", "b", ConnectOptions::default());
        let seen = recorder(&remote);
        let local_dyn: Arc<dyn Connection> = local.clone();

        send_when_open(&local_dyn, json!("hi")).unwrap();
        settle().await;
        assert!(lock(&seen).is_empty());

        remote.mark_open().await;
        local.mark_open().await;
        settle().await;
        assert_eq!(*lock(&seen), vec![json!("hi")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_on_open_connection_is_immediate() {
        let (local, remote) = MemoryConnection::pair("a", "b", ConnectOptions::default());
        remote.mark_open().await;
        local.mark_open().await;
        let seen = recorder(&remote);
        let local_dyn: Arc<dyn Connection> = local.clone();

        send_when_open(&local_dyn, json!(1)).unwrap();
        assert_eq!(local.events().listener_count(OPEN_EVENT), 0);
        settle().await;

        assert_eq!(*lock(&seen), vec![json!(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_open() {
        let (local, _remote) = MemoryConnection::pair("a", "b", ConnectOptions::default());
        let local_dyn: Arc<dyn Connection> = local.clone();
        let waiter = tokio::spawn(async move { wait_open(&local_dyn).await });
        settle().await;
        assert!(!waiter.is_finished());

        local.mark_open().await;
        settle().await;
        assert!(waiter.is_finished());
    }
}
