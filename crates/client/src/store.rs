use ludum_core::protocol::SessionIds;
use ludum_core::sync::lock;
use std::collections::HashMap;
use std::sync::Mutex;

pub const GAME_ID_KEY: &str = "ludum_gameId";
pub const PLAYER_ID_KEY: &str = "ludum_playerId";

/// Small key/value store surviving a page reload on the client, used to
/// remember which game and player to reconnect as.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str);

    /// Both identifiers, if a previous join left them behind.
    fn session(&self) -> Option<SessionIds> {
        Some(SessionIds {
            game_id: self.get(GAME_ID_KEY)?,
            player_id: self.get(PLAYER_ID_KEY)?,
        })
    }

    fn save_session(&self, ids: &SessionIds) {
        self.set(GAME_ID_KEY, &ids.game_id);
        self.set(PLAYER_ID_KEY, &ids.player_id);
    }

    fn clear_session(&self) {
        self.remove(GAME_ID_KEY);
        self.remove(PLAYER_ID_KEY);
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        lock(&self.entries).insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        lock(&self.entries).remove(key);
    }
}
