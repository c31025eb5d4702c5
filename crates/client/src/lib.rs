pub mod online;
pub mod store;

pub use online::{ClientContext, ClientPhase, OnlineGame};
pub use store::{MemorySessionStore, SessionStore, GAME_ID_KEY, PLAYER_ID_KEY};
