//! Player registry.
//!
//! The single source of truth for who is connected and where they are.
//! Rooms are not stored here; they are a filter over each player's `room`.
//!
//! Absent identities are normal (a disconnect can race any other event), so
//! lookups return `Option` and updates on missing players are no-ops.

use std::collections::BTreeMap;

use wander_shared::{
    math::Vec3,
    net::ClientId,
    player::{Player, PlayerPatch},
    room::RoomKey,
};

/// Owned store of connected players, keyed and ordered by identity.
#[derive(Debug, Clone)]
pub struct PlayerRegistry {
    players: BTreeMap<ClientId, Player>,
    default_room: RoomKey,
    default_spawn: Vec3,
    name_prefix: String,
}

impl PlayerRegistry {
    pub fn new(default_room: RoomKey, default_spawn: Vec3, name_prefix: &str) -> Self {
        Self {
            players: BTreeMap::new(),
            default_room,
            default_spawn,
            name_prefix: name_prefix.to_string(),
        }
    }

    pub fn default_room(&self) -> &RoomKey {
        &self.default_room
    }

    /// Creates the record for a new identity in the starting room.
    ///
    /// If the identity is already registered the existing record is returned
    /// unchanged.
    pub fn register(&mut self, id: ClientId) -> Player {
        if let Some(existing) = self.players.get(&id) {
            return existing.clone();
        }
        let player = Player::spawn(
            id,
            format!("{} {}", self.name_prefix, id),
            self.default_room.clone(),
            self.default_spawn,
        );
        self.players.insert(id, player.clone());
        player
    }

    pub fn get(&self, id: ClientId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Merges `patch` into the record. Returns false if `id` is absent.
    pub fn update(&mut self, id: ClientId, patch: PlayerPatch) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => {
                player.apply(patch);
                true
            }
            None => false,
        }
    }

    /// Deletes the record and returns it.
    pub fn remove(&mut self, id: ClientId) -> Option<Player> {
        self.players.remove(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// All players, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Players whose room equals `room`, ordered by id.
    pub fn in_room<'a>(&'a self, room: &'a RoomKey) -> impl Iterator<Item = &'a Player> + 'a {
        self.players.values().filter(move |p| &p.room == room)
    }
}
