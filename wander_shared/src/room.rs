//! Room catalog.
//!
//! Rooms are map sections the client can load. The catalog is fixed
//! configuration: players move between rooms but never create them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Room identifier, e.g. `map1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn new(key: impl Into<String>) -> Self {
        RoomKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomKey {
    fn from(s: &str) -> Self {
        RoomKey(s.to_string())
    }
}

/// Catalog entry describing one loadable room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Map asset the client loads, e.g. `map1.glb`.
    pub asset: String,
    /// Display name shown in the room menu.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Where players land when they enter the room.
    #[serde(default)]
    pub spawn: Vec3,
}

impl RoomInfo {
    pub fn new(asset: &str, name: &str, description: &str) -> Self {
        RoomInfo {
            asset: asset.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            spawn: Vec3::ZERO,
        }
    }
}

/// Room listing entry sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub key: RoomKey,
    #[serde(flatten)]
    pub info: RoomInfo,
}

/// Mapping from room key to room info, ordered by key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCatalog {
    rooms: BTreeMap<RoomKey, RoomInfo>,
}

impl RoomCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rooms shipped with the game client.
    pub fn builtin() -> Self {
        let mut catalog = RoomCatalog::new();
        catalog.insert(
            "map1",
            RoomInfo::new("map1.glb", "Main Spawn", "Classrooms and starting point"),
        );
        catalog.insert(
            "map2",
            RoomInfo::new("map2.glb", "The Corridor", "The central passage between rooms"),
        );
        catalog.insert(
            "room1",
            RoomInfo::new("map1.glb", "Classroom 1", "Lecture room A-101"),
        );
        catalog.insert(
            "room2",
            RoomInfo::new("map1.glb", "Classroom 2", "Lecture room B-202"),
        );
        catalog
    }

    pub fn insert(&mut self, key: impl Into<RoomKey>, info: RoomInfo) {
        self.rooms.insert(key.into(), info);
    }

    pub fn get(&self, key: &str) -> Option<&RoomInfo> {
        self.rooms.get(&RoomKey::new(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RoomKey> {
        self.rooms.keys()
    }

    /// Spawn point for a room, zero for unknown keys.
    pub fn spawn_point(&self, key: &RoomKey) -> Vec3 {
        self.rooms.get(key).map(|r| r.spawn).unwrap_or(Vec3::ZERO)
    }

    pub fn summaries(&self) -> Vec<RoomSummary> {
        self.rooms
            .iter()
            .map(|(key, info)| RoomSummary {
                key: key.clone(),
                info: info.clone(),
            })
            .collect()
    }
}

impl From<String> for RoomKey {
    fn from(s: String) -> Self {
        RoomKey(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_shipped_rooms() {
        let catalog = RoomCatalog::builtin();
        assert_eq!(catalog.len(), 4);
        for key in ["map1", "map2", "room1", "room2"] {
            assert!(catalog.contains(key), "missing {key}");
        }
        assert!(!catalog.contains("nonexistent"));
    }

    #[test]
    fn catalog_parses_from_json_object() {
        let json = r#"{
            "lobby": { "asset": "lobby.glb", "name": "Lobby", "spawn": { "x": 1.0, "y": 0.0, "z": 2.0 } },
            "hall": { "asset": "hall.glb", "name": "Hall", "description": "Big" }
        }"#;
        let catalog: RoomCatalog = serde_json::from_str(json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("hall").unwrap().description, "Big");
        assert_eq!(
            catalog.spawn_point(&RoomKey::new("lobby")),
            Vec3::new(1.0, 0.0, 2.0)
        );
        assert_eq!(catalog.spawn_point(&RoomKey::new("hall")), Vec3::ZERO);
    }

    #[test]
    fn summaries_are_ordered_by_key() {
        let keys: Vec<String> = RoomCatalog::builtin()
            .summaries()
            .into_iter()
            .map(|s| s.key.to_string())
            .collect();
        assert_eq!(keys, vec!["map1", "map2", "room1", "room2"]);
    }
}
