use std::fmt;

/// Programmer-usage errors raised by the phase machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseError {
    /// The phase does not provide a usable identifier.
    InvalidPhase,
    /// A phase with this identifier is already registered.
    AlreadyRegistered(String),
    /// No registered phase has this identifier.
    UnknownPhase(String),
    /// `start` was called before any phase was registered.
    NoPhases,
}

impl fmt::Display for PhaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseError::InvalidPhase => write!(f, "phase must define a non-empty id"),
            PhaseError::AlreadyRegistered(id) => write!(f, "phase \"{}\" is already registered", id),
            PhaseError::UnknownPhase(id) => {
                write!(f, "no phase with id \"{}\" found, did you register it?", id)
            }
            PhaseError::NoPhases => write!(f, "no phase registered"),
        }
    }
}

impl std::error::Error for PhaseError {}

/// Error when sending over a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport is no longer connected.
    Disconnected,
    /// The payload could not be encoded.
    Encode(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Disconnected => write!(f, "transport is disconnected"),
            TransportError::Encode(reason) => write!(f, "failed to encode payload: {}", reason),
        }
    }
}

impl std::error::Error for TransportError {}
