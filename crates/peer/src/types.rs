use crate::connection::Connection;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a [`crate::PeerGame`].
#[derive(Clone, Debug, Default)]
pub struct PeerConfig {
    /// Give up on a request after this long. `None` waits forever.
    pub request_timeout: Option<Duration>,
}

/// A reply to a request, with the connection it came back on.
#[derive(Clone)]
pub struct PeerResponse {
    pub connection: Arc<dyn Connection>,
    pub value: Value,
}

impl fmt::Debug for PeerResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerResponse")
            .field("peer", &self.connection.peer())
            .field("value", &self.value)
            .finish()
    }
}
