use crate::connection::{ConnectOptions, Connection};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// A connection offered by a remote peer. Accepting it tells the remote
/// side the local handlers are in place, after which the channel opens.
pub struct IncomingConnection {
    connection: Arc<dyn Connection>,
    answer: Option<oneshot::Sender<()>>,
}

impl IncomingConnection {
    pub fn new(connection: Arc<dyn Connection>, answer: Option<oneshot::Sender<()>>) -> Self {
        Self { connection, answer }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn accept(mut self) -> Arc<dyn Connection> {
        if let Some(answer) = self.answer.take() {
            let _ = answer.send(());
        }
        self.connection
    }
}

pub enum SignalEvent {
    /// A remote peer opened a connection to us.
    Connection(IncomingConnection),
    /// The link to the signaling service dropped.
    Disconnected,
}

/// Brokers peer-to-peer connections.
#[async_trait]
pub trait Signaling: Send + Sync {
    /// Our id, once the signaling service assigned one.
    async fn peer_id(&self) -> String;

    /// Start connecting to `remote`. The returned connection opens later.
    fn connect(&self, remote: &str, options: ConnectOptions) -> Arc<dyn Connection>;

    fn reconnect(&self);

    /// Stream of signaling events. Only the first caller gets it.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SignalEvent>>;
}
