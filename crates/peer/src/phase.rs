use crate::connection::Connection;
use async_trait::async_trait;
use ludum_core::Phase;
use serde_json::Value;
use std::sync::Arc;

/// A phase of a peer-to-peer game. While current, a phase that handles
/// peer messages answers every inbound request; its return value is sent
/// back as the reply.
#[async_trait]
pub trait PeerPhase: Phase {
    fn handles_peer_messages(&self) -> bool {
        false
    }

    async fn on_peer_message(&self, _data: Value, _from: Arc<dyn Connection>) -> Value {
        Value::Null
    }
}
