use crate::types::PlayerId;
use ludum_core::Transport;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Field added to the metadata in a player's public record.
pub const UNIQ_ID_FIELD: &str = "uniqId";

/// A participant of one game: the transport it currently talks through,
/// its stable id and whatever the client sent along when joining.
#[derive(Clone)]
pub struct Player {
    id: PlayerId,
    transport: Arc<dyn Transport>,
    metadata: Map<String, Value>,
}

impl Player {
    pub fn new(id: PlayerId, transport: Arc<dyn Transport>, metadata: Map<String, Value>) -> Self {
        Self {
            id,
            transport,
            metadata,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Bind the player to a new transport, disconnecting the stale one if
    /// it is still up. Returns the stale transport.
    pub fn replace_transport(&mut self, transport: Arc<dyn Transport>) -> Arc<dyn Transport> {
        if self.transport.is_connected() {
            self.transport.disconnect();
        }
        std::mem::replace(&mut self.transport, transport)
    }

    /// Public record sent to other clients: the metadata plus `uniqId`.
    pub fn serialize(&self) -> Value {
        let mut record = self.metadata.clone();
        record.insert(UNIQ_ID_FIELD.to_owned(), Value::String(self.id.clone()));
        Value::Object(record)
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("id", &self.id)
            .field("transport", &self.transport.id())
            .field("metadata", &self.metadata)
            .finish()
    }
}
