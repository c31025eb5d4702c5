pub mod errors;
pub mod game;
pub mod player;
pub mod roster;
pub mod server;
pub mod types;
pub mod ws;

pub use errors::{ConfigError, CreateGameError, JoinError, ReconnectError};
pub use ludum_core::protocol::{
    to_payload, ControlEvent, CreateGameRequest, JoinErrorNotice, JoinGameRequest, PlayerNotice,
    SessionIds, SwitchPhase,
};
pub use game::{Game, GamePhase, SocketContext};
pub use player::{Player, UNIQ_ID_FIELD};
pub use roster::Roster;
pub use server::{ControlContext, GameDefinition, SessionCoordinator};
pub use types::{GameId, GameInfo, PlayerId, ServerConfig};
pub use ws::{listen, router, serve, WireMessage, WsTransport};
