use std::fmt;

/// Error from a peer connection or a request sent over one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// No live connection to send on.
    NoConnection,
    /// The connection is not open.
    NotOpen,
    /// The connection went away before the reply arrived.
    Closed,
    /// No reply within the configured request timeout.
    Timeout,
    /// The message could not be encoded.
    Encode(String),
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerError::NoConnection => write!(f, "no peer connection"),
            PeerError::NotOpen => write!(f, "connection is not open"),
            PeerError::Closed => write!(f, "connection closed before the reply"),
            PeerError::Timeout => write!(f, "request timed out"),
            PeerError::Encode(msg) => write!(f, "encode error: {}", msg),
        }
    }
}

impl std::error::Error for PeerError {}
