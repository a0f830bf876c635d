//! Player record as replicated to clients.

use serde::{Deserialize, Serialize};

use crate::{math::Vec3, net::ClientId, room::RoomKey};

/// Replicated state of one connected player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: ClientId,
    pub position: Vec3,
    /// Yaw in radians.
    pub rotation: f32,
    pub name: String,
    pub room: RoomKey,
}

impl Player {
    /// Fresh spawn state for a new connection.
    pub fn spawn(id: ClientId, name: String, room: RoomKey, position: Vec3) -> Self {
        Player {
            id,
            position,
            rotation: 0.0,
            name,
            room,
        }
    }

    /// Merges the fields present in `patch`.
    pub fn apply(&mut self, patch: PlayerPatch) {
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(rotation) = patch.rotation {
            self.rotation = rotation;
        }
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(room) = patch.room {
            self.room = room;
        }
    }
}

/// Partial update for a [`Player`]. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerPatch {
    pub position: Option<Vec3>,
    pub rotation: Option<f32>,
    pub name: Option<String>,
    pub room: Option<RoomKey>,
}

impl PlayerPatch {
    pub fn pose(position: Vec3, rotation: f32) -> Self {
        PlayerPatch {
            position: Some(position),
            rotation: Some(rotation),
            ..Default::default()
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        PlayerPatch {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Room change with position reset to the room's entry point.
    pub fn enter_room(room: RoomKey, spawn: Vec3) -> Self {
        PlayerPatch {
            room: Some(room),
            position: Some(spawn),
            ..Default::default()
        }
    }
}
