use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a game instance on a server.
pub type GameId = String;

/// Stable identifier handed to a player at join time, reused on reconnect.
pub type PlayerId = String;

/// Arguments forwarded to a phase's start callback.
pub type PhaseArgs = Vec<serde_json::Value>;

/// Process-unique identity of a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(pub u64);

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

impl TransportId {
    /// Allocate a fresh identity.
    pub fn next() -> Self {
        Self(NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}
