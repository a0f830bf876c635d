//! Room router.
//!
//! Computes broadcast sets and sequences the join/switch/leave transitions.
//! The router owns the registry; room membership is always derived from
//! each player's `room` field, never tracked separately.
//!
//! Operations return the [`Delivery`] list they produce instead of sending,
//! so the whole transition can be checked without sockets.

use std::collections::BTreeSet;

use tracing::{debug, info};
use wander_shared::{
    config::ServerConfig,
    net::ClientId,
    player::{Player, PlayerPatch},
    protocol::ServerMsg,
    room::{RoomCatalog, RoomKey},
};

use crate::registry::PlayerRegistry;

/// One outbound message and the connections it goes to.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub targets: Vec<ClientId>,
    pub msg: ServerMsg,
}

impl Delivery {
    pub fn to(id: ClientId, msg: ServerMsg) -> Self {
        Delivery {
            targets: vec![id],
            msg,
        }
    }

    pub fn includes(&self, id: ClientId) -> bool {
        self.targets.contains(&id)
    }
}

/// Appends a delivery unless it has nobody to go to.
pub(crate) fn push_delivery(out: &mut Vec<Delivery>, targets: Vec<ClientId>, msg: ServerMsg) {
    if !targets.is_empty() {
        out.push(Delivery { targets, msg });
    }
}

/// Room membership and transition sequencing over a [`PlayerRegistry`].
#[derive(Debug, Clone)]
pub struct RoomRouter {
    registry: PlayerRegistry,
    catalog: RoomCatalog,
}

impl RoomRouter {
    pub fn new(registry: PlayerRegistry, catalog: RoomCatalog) -> Self {
        Self { registry, catalog }
    }

    /// Builds an empty router from server configuration.
    pub fn from_config(cfg: &ServerConfig) -> Self {
        let spawn = cfg.rooms.spawn_point(&cfg.default_room);
        let registry = PlayerRegistry::new(cfg.default_room.clone(), spawn, &cfg.name_prefix);
        Self::new(registry, cfg.rooms.clone())
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PlayerRegistry {
        &mut self.registry
    }

    pub fn catalog(&self) -> &RoomCatalog {
        &self.catalog
    }

    /// Maps a requested key onto a catalog room. Unknown keys resolve to the
    /// default room; rooms are never created on demand.
    pub fn resolve_room(&self, requested: &str) -> RoomKey {
        if self.catalog.contains(requested) {
            RoomKey::new(requested)
        } else {
            self.registry.default_room().clone()
        }
    }

    /// Every registered player in `room`, self included.
    pub fn members_of(&self, room: &RoomKey) -> BTreeSet<ClientId> {
        self.registry.in_room(room).map(|p| p.id).collect()
    }

    /// Members of `room` other than `except`, ordered by id.
    pub fn others_in(&self, room: &RoomKey, except: ClientId) -> Vec<ClientId> {
        self.registry
            .in_room(room)
            .filter(|p| p.id != except)
            .map(|p| p.id)
            .collect()
    }

    fn snapshot_excluding(&self, room: &RoomKey, except: ClientId) -> ServerMsg {
        let players: Vec<Player> = self
            .registry
            .in_room(room)
            .filter(|p| p.id != except)
            .cloned()
            .collect();
        ServerMsg::JoinSnapshot {
            room: room.clone(),
            players,
        }
    }

    /// First entry of a freshly registered player into its starting room.
    ///
    /// The joiner gets a snapshot of the other members; the other members get
    /// one `PlayerJoined`. The joiner never appears in its own snapshot and
    /// nobody sees the joiner twice.
    pub fn join_initial(&self, id: ClientId) -> Vec<Delivery> {
        let Some(player) = self.registry.get(id) else {
            return Vec::new();
        };
        let room = player.room.clone();

        let mut out = Vec::with_capacity(2);
        out.push(Delivery::to(id, self.snapshot_excluding(&room, id)));
        push_delivery(
            &mut out,
            self.others_in(&room, id),
            ServerMsg::PlayerJoined(player.clone()),
        );

        info!(client_id = %id, room = %room, "Player joined room");
        out
    }

    /// Moves a player to another room.
    ///
    /// The registry is updated first (room plus position reset to the room's
    /// spawn point), then the old room hears `PlayerLeft`, the new room hears
    /// `PlayerJoined`, and the mover gets a snapshot of its new room taken
    /// after the move.
    pub fn switch_room(&mut self, id: ClientId, requested: &str) -> Vec<Delivery> {
        let Some(old_room) = self.registry.get(id).map(|p| p.room.clone()) else {
            debug!(client_id = %id, "Room switch for unknown client ignored");
            return Vec::new();
        };
        let new_room = self.resolve_room(requested);
        if new_room.as_str() != requested {
            debug!(client_id = %id, requested, fallback = %new_room, "Unknown room, using default");
        }

        let spawn = self.catalog.spawn_point(&new_room);
        self.registry
            .update(id, PlayerPatch::enter_room(new_room.clone(), spawn));
        let Some(player) = self.registry.get(id).cloned() else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(3);
        push_delivery(
            &mut out,
            self.others_in(&old_room, id),
            ServerMsg::PlayerLeft { id },
        );
        push_delivery(
            &mut out,
            self.others_in(&new_room, id),
            ServerMsg::PlayerJoined(player),
        );
        out.push(Delivery::to(id, self.snapshot_excluding(&new_room, id)));

        info!(client_id = %id, from = %old_room, to = %new_room, "Player switched room");
        out
    }

    /// Removes a disconnected player and tells its last room.
    /// A second call for the same identity does nothing.
    pub fn leave(&mut self, id: ClientId) -> Vec<Delivery> {
        let Some(gone) = self.registry.remove(id) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(1);
        push_delivery(
            &mut out,
            self.registry.in_room(&gone.room).map(|p| p.id).collect(),
            ServerMsg::PlayerLeft { id },
        );
        info!(client_id = %id, room = %gone.room, "Player left");
        out
    }
}
