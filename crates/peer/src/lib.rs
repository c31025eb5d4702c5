pub mod connection;
pub mod envelope;
pub mod errors;
pub mod game;
pub mod memory;
pub mod phase;
pub mod signaling;
pub mod types;

pub use connection::{
    send_when_open, wait_open, ConnectOptions, Connection, Serialization, CLOSE_EVENT, DATA_EVENT,
    OPEN_EVENT,
};
pub use envelope::{correlation_id, Envelope, MessageType, Metadata};
pub use errors::PeerError;
pub use game::PeerGame;
pub use memory::{MemoryConnection, MemoryHub, MemoryPeer};
pub use phase::PeerPhase;
pub use signaling::{IncomingConnection, SignalEvent, Signaling};
pub use types::{PeerConfig, PeerResponse};
