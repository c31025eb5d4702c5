//! Wire envelope for peer messages:
//! `{"metadata": {"type": "request"|"reply", "id"?, "replyTo"?}, "data": any}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Request,
    Reply,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub metadata: Metadata,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn request(id: &str, data: Value) -> Self {
        Self {
            metadata: Metadata {
                kind: MessageType::Request,
                id: Some(id.to_owned()),
                reply_to: None,
            },
            data,
        }
    }

    pub fn reply(reply_to: &str, data: Value) -> Self {
        Self {
            metadata: Metadata {
                kind: MessageType::Reply,
                id: None,
                reply_to: Some(reply_to.to_owned()),
            },
            data,
        }
    }

    /// Decode an inbound payload. Anything that is not an envelope yields
    /// `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn is_reply_to(&self, request_id: &str) -> bool {
        self.metadata.kind == MessageType::Reply
            && self.metadata.reply_to.as_deref() == Some(request_id)
    }

    pub fn request_id(&self) -> Option<&str> {
        match self.metadata.kind {
            MessageType::Request => self.metadata.id.as_deref(),
            MessageType::Reply => None,
        }
    }
}

/// Fresh id for an outbound request. Random, so collisions are possible
/// in principle but negligible for the handful of requests in flight on
/// one connection.
pub fn correlation_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        assert_eq!(
            Envelope::request("a1", json!("ping")).to_value(),
            json!({"metadata": {"type": "request", "id": "a1"}, "data": "ping"})
        );
        assert_eq!(
            Envelope::reply("a1", json!("pong")).to_value(),
            json!({"metadata": {"type": "reply", "replyTo": "a1"}, "data": "pong"})
        );
    }

    #[test]
    fn test_reply_matching() {
        let reply = Envelope::from_value(json!({
            "metadata": {"type": "reply", "replyTo": "a1"},
            "data": 3
        }))
        .unwrap();

        assert!(reply.is_reply_to("a1"));
        assert!(!reply.is_reply_to("b2"));
        assert_eq!(reply.request_id(), None);
        assert!(!Envelope::request("a1", Value::Null).is_reply_to("a1"));
        assert_eq!(Envelope::from_value(json!("hello")), None);
    }

    #[test]
    fn test_correlation_ids_differ() {
        assert_ne!(correlation_id(), correlation_id());
        assert_eq!(correlation_id().len(), 16);
    }
}
