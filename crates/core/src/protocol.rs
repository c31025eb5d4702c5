//! Control events exchanged between the coordinator and its clients, and
//! their payloads.

use crate::types::{GameId, PlayerId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlEvent {
    /// Greeting sent to every accepted transport.
    Connection,
    CreateGame,
    JoinGame,
    JoinError,
    GameJoined,
    NewPlayerJoined,
    ReadyToPlay,
    SwitchPhase,
    ActivePlayers,
    PlayerConnectionDifficulties,
    PlayerLeft,
    ReconnectToGame,
    CantReconnect,
}

impl ControlEvent {
    pub const ALL: [ControlEvent; 13] = [
        ControlEvent::Connection,
        ControlEvent::CreateGame,
        ControlEvent::JoinGame,
        ControlEvent::JoinError,
        ControlEvent::GameJoined,
        ControlEvent::NewPlayerJoined,
        ControlEvent::ReadyToPlay,
        ControlEvent::SwitchPhase,
        ControlEvent::ActivePlayers,
        ControlEvent::PlayerConnectionDifficulties,
        ControlEvent::PlayerLeft,
        ControlEvent::ReconnectToGame,
        ControlEvent::CantReconnect,
    ];

    /// Event name on the wire.
    pub const fn name(self) -> &'static str {
        match self {
            ControlEvent::Connection => "connection",
            ControlEvent::CreateGame => "createGame",
            ControlEvent::JoinGame => "joinGame",
            ControlEvent::JoinError => "joinError",
            ControlEvent::GameJoined => "gameJoined",
            ControlEvent::NewPlayerJoined => "newPlayerJoined",
            ControlEvent::ReadyToPlay => "readyToPlay",
            ControlEvent::SwitchPhase => "switchPhase",
            ControlEvent::ActivePlayers => "activePlayers",
            ControlEvent::PlayerConnectionDifficulties => "playerConnectionDifficulties",
            ControlEvent::PlayerLeft => "playerLeft",
            ControlEvent::ReconnectToGame => "reconnectToGame",
            ControlEvent::CantReconnect => "cantReconnect",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.name() == name)
    }
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Encode a payload struct for `Transport::emit`.
pub fn to_payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateGameRequest {
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGameRequest {
    pub game_id: GameId,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Sent by a returning client, and echoed back as the `gameJoined` ack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIds {
    pub game_id: GameId,
    pub player_id: PlayerId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinErrorNotice {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<GameId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchPhase {
    pub phase_name: String,
    #[serde(default)]
    pub data: Vec<Value>,
}

/// Payload of `playerConnectionDifficulties` and `playerLeft`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerNotice {
    pub player_id: PlayerId,
}
