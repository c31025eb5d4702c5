use crate::errors::ConfigError;
pub use ludum_core::{GameId, PlayerId};
use std::time::Duration;

/// Information about a game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameInfo {
    pub game_id: GameId,
    pub phase: Option<String>,
    pub player_count: usize,
    pub max_players: usize,
}

/// Configuration for the session coordinator.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Players needed to fill a game.
    pub max_players: usize,
    /// How long a disconnected player may take to come back before the
    /// others are told they left.
    pub reconnect_grace_period: Duration,
    /// Maximum number of concurrent games.
    pub max_games: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_players: 2,
            reconnect_grace_period: Duration::from_secs(5),
            max_games: 100,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_players == 0 {
            return Err(ConfigError::NoSeats);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(ServerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_zero_seats_rejected() {
        let config = ServerConfig {
            max_players: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoSeats));
    }
}
