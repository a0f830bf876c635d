//! Sync protocol messages.
//!
//! | Message        | Direction | Delivered to                        |
//! |----------------|-----------|-------------------------------------|
//! | `Welcome`      | s -> c    | the new connection                  |
//! | `JoinSnapshot` | s -> c    | the joiner, once per join/switch    |
//! | `PlayerJoined` | s -> c    | other members of the entered room   |
//! | `PlayerMoved`  | s -> c    | other members (rename: whole room)  |
//! | `PlayerLeft`   | s -> c    | remaining members of the left room  |
//! | `Chat`         | s -> c    | whole room, sender included         |
//! | `Movement`     | c -> s    |                                     |
//! | `SwitchRoom`   | c -> s    |                                     |
//! | `Chat`         | c -> s    |                                     |
//! | `Rename`       | c -> s    |                                     |
//!
//! Messages are JSON objects tagged by a `type` field.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    chat::{self, ChatLine},
    math::Vec3,
    net::ClientId,
    player::Player,
    room::{RoomKey, RoomSummary},
};

/// Client -> server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// First frame on every connection.
    Hello { protocol: u32 },
    /// Local pose, sent once per client tick. The server trusts it as-is.
    Movement { position: Vec3, rotation: f32 },
    SwitchRoom { room: String },
    Chat { text: String },
    Rename { name: String },
}

impl ClientMsg {
    /// Shape checks and normalization applied before a message reaches the
    /// registry. Chat text and names come back trimmed.
    pub fn validate(self) -> Result<Self, ProtocolError> {
        match self {
            ClientMsg::Movement { position, rotation } => {
                if !position.is_finite() || !rotation.is_finite() {
                    return Err(ProtocolError::NonFinitePose);
                }
                Ok(ClientMsg::Movement { position, rotation })
            }
            ClientMsg::SwitchRoom { room } => {
                let room = room.trim();
                if room.is_empty() {
                    return Err(ProtocolError::EmptyRoomKey);
                }
                Ok(ClientMsg::SwitchRoom {
                    room: room.to_string(),
                })
            }
            ClientMsg::Chat { text } => chat::clean_text(&text)
                .map(|text| ClientMsg::Chat { text })
                .ok_or(ProtocolError::EmptyChat),
            ClientMsg::Rename { name } => chat::clean_name(&name)
                .map(|name| ClientMsg::Rename { name })
                .ok_or(ProtocolError::InvalidName),
            hello @ ClientMsg::Hello { .. } => Ok(hello),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMsg::Hello { .. } => "hello",
            ClientMsg::Movement { .. } => "movement",
            ClientMsg::SwitchRoom { .. } => "switch_room",
            ClientMsg::Chat { .. } => "chat",
            ClientMsg::Rename { .. } => "rename",
        }
    }
}

/// Server -> client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Handshake reply: the assigned identity, the player's own record, and
    /// the room catalog for the room menu.
    Welcome {
        id: ClientId,
        player: Player,
        default_room: RoomKey,
        rooms: Vec<RoomSummary>,
    },
    /// Every other member of `room`, ordered by id. Never contains the
    /// receiver.
    JoinSnapshot { room: RoomKey, players: Vec<Player> },
    PlayerJoined(Player),
    /// Full current record. Also used to refresh name labels after a rename.
    PlayerMoved(Player),
    PlayerLeft { id: ClientId },
    Chat(ChatLine),
    Disconnect { reason: String },
}

impl ServerMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMsg::Welcome { .. } => "welcome",
            ServerMsg::JoinSnapshot { .. } => "join_snapshot",
            ServerMsg::PlayerJoined(_) => "player_joined",
            ServerMsg::PlayerMoved(_) => "player_moved",
            ServerMsg::PlayerLeft { .. } => "player_left",
            ServerMsg::Chat(_) => "chat",
            ServerMsg::Disconnect { .. } => "disconnect",
        }
    }
}

/// Rejected inbound payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    NonFinitePose,
    EmptyRoomKey,
    EmptyChat,
    InvalidName,
    VersionMismatch { expected: u32, got: u32 },
    MissingHello,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::NonFinitePose => write!(f, "pose contains non-finite numbers"),
            ProtocolError::EmptyRoomKey => write!(f, "room key is empty"),
            ProtocolError::EmptyChat => write!(f, "chat text is empty"),
            ProtocolError::InvalidName => write!(
                f,
                "name must be 1 to {} characters",
                chat::MAX_NAME_LENGTH
            ),
            ProtocolError::VersionMismatch { expected, got } => {
                write!(f, "protocol version {got} not supported (expected {expected})")
            }
            ProtocolError::MissingHello => write!(f, "expected hello as first message"),
        }
    }
}

impl std::error::Error for ProtocolError {}
