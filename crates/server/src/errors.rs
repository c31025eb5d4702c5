use ludum_core::PhaseError;
use std::fmt;

/// Rejected [`ServerConfig`](crate::types::ServerConfig).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_players` is zero, so no game could ever be joined.
    NoSeats,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoSeats => write!(f, "max_players must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Error when creating a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateGameError {
    /// Maximum number of concurrent games reached.
    TooManyGames,
    /// The game definition failed to register or start its phases.
    Setup(PhaseError),
    /// The creating transport could not be admitted.
    Join(JoinError),
}

impl fmt::Display for CreateGameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateGameError::TooManyGames => write!(f, "maximum number of games reached"),
            CreateGameError::Setup(err) => write!(f, "game setup failed: {}", err),
            CreateGameError::Join(err) => write!(f, "creator could not join: {}", err),
        }
    }
}

impl std::error::Error for CreateGameError {}

impl From<PhaseError> for CreateGameError {
    fn from(err: PhaseError) -> Self {
        CreateGameError::Setup(err)
    }
}

/// Error when joining a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// No game with that id.
    GameNotFound,
    /// The game already holds its maximum number of players.
    GameFull,
}

impl JoinError {
    /// Reason string sent to the client in a `joinError` notice.
    pub fn reason(&self) -> &'static str {
        match self {
            JoinError::GameNotFound => "gameNotFound",
            JoinError::GameFull => "gameFull",
        }
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::GameNotFound => write!(f, "game not found"),
            JoinError::GameFull => write!(f, "game is full"),
        }
    }
}

impl std::error::Error for JoinError {}

/// Error when re-binding a returning player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectError {
    /// No game with that id.
    GameNotFound,
    /// The game has no player with that id.
    PlayerNotFound,
}

impl fmt::Display for ReconnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconnectError::GameNotFound => write!(f, "game not found"),
            ReconnectError::PlayerNotFound => write!(f, "player not found in game"),
        }
    }
}

impl std::error::Error for ReconnectError {}
