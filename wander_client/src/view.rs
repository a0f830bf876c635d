//! Remote player view.
//!
//! Mirrors the other players of the current room from server messages and
//! keeps the last two poses of each for interpolation. A snapshot replaces
//! the whole view, so a room switch never leaves stale avatars behind.

use std::collections::BTreeMap;

use wander_shared::{
    math::{lerp_yaw, Vec3},
    net::ClientId,
    player::Player,
    protocol::ServerMsg,
    room::RoomKey,
};

/// One remote avatar.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub player: Player,
    prev_position: Vec3,
    prev_rotation: f32,
}

impl RemotePlayer {
    fn new(player: Player) -> Self {
        Self {
            prev_position: player.position,
            prev_rotation: player.rotation,
            player,
        }
    }

    fn update(&mut self, player: Player) {
        self.prev_position = self.player.position;
        self.prev_rotation = self.player.rotation;
        self.player = player;
    }

    /// Pose between the previous and latest update. `alpha` in `[0, 1]`.
    pub fn interp(&self, alpha: f32) -> (Vec3, f32) {
        (
            self.prev_position.lerp(self.player.position, alpha),
            lerp_yaw(self.prev_rotation, self.player.rotation, alpha),
        )
    }
}

/// Other players in the local player's room.
#[derive(Debug, Clone)]
pub struct RemotePlayers {
    me: ClientId,
    room: Option<RoomKey>,
    players: BTreeMap<ClientId, RemotePlayer>,
}

impl RemotePlayers {
    pub fn new(me: ClientId) -> Self {
        Self {
            me,
            room: None,
            players: BTreeMap::new(),
        }
    }

    /// Room of the last snapshot, if one has arrived.
    pub fn room(&self) -> Option<&RoomKey> {
        self.room.as_ref()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn get(&self, id: ClientId) -> Option<&RemotePlayer> {
        self.players.get(&id)
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.players.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemotePlayer> {
        self.players.values()
    }

    /// Applies a server message. Messages about the local player are ignored.
    pub fn apply(&mut self, msg: &ServerMsg) {
        match msg {
            ServerMsg::JoinSnapshot { room, players } => {
                self.room = Some(room.clone());
                self.players = players
                    .iter()
                    .filter(|p| p.id != self.me)
                    .map(|p| (p.id, RemotePlayer::new(p.clone())))
                    .collect();
            }
            ServerMsg::PlayerJoined(p) if p.id != self.me => {
                self.players.insert(p.id, RemotePlayer::new(p.clone()));
            }
            ServerMsg::PlayerMoved(p) if p.id != self.me => {
                if self.room.as_ref().is_some_and(|r| r != &p.room) {
                    return;
                }
                match self.players.get_mut(&p.id) {
                    Some(remote) => remote.update(p.clone()),
                    None => {
                        self.players.insert(p.id, RemotePlayer::new(p.clone()));
                    }
                }
            }
            ServerMsg::PlayerLeft { id } => {
                self.players.remove(id);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: u32, room: &str, x: f32) -> Player {
        let mut p = Player::spawn(ClientId(id), format!("P{id}"), RoomKey::new(room), Vec3::ZERO);
        p.position = Vec3::new(x, 0.0, 0.0);
        p
    }

    #[test]
    fn snapshot_replaces_view_and_skips_self() {
        let mut view = RemotePlayers::new(ClientId(1));
        view.apply(&ServerMsg::PlayerJoined(player(5, "map1", 0.0)));
        view.apply(&ServerMsg::JoinSnapshot {
            room: RoomKey::new("map2"),
            players: vec![player(1, "map2", 0.0), player(2, "map2", 0.0)],
        });
        assert_eq!(view.ids(), vec![ClientId(2)]);
        assert_eq!(view.room().map(|r| r.as_str()), Some("map2"));
    }

    #[test]
    fn join_move_leave_lifecycle() {
        let mut view = RemotePlayers::new(ClientId(1));
        view.apply(&ServerMsg::JoinSnapshot {
            room: RoomKey::new("map1"),
            players: vec![],
        });
        view.apply(&ServerMsg::PlayerJoined(player(2, "map1", 0.0)));
        view.apply(&ServerMsg::PlayerMoved(player(2, "map1", 4.0)));

        let (pos, _) = view.get(ClientId(2)).unwrap().interp(0.5);
        assert_eq!(pos, Vec3::new(2.0, 0.0, 0.0));

        view.apply(&ServerMsg::PlayerLeft { id: ClientId(2) });
        assert!(view.is_empty());
    }

    #[test]
    fn moves_from_other_rooms_and_self_are_ignored() {
        let mut view = RemotePlayers::new(ClientId(1));
        view.apply(&ServerMsg::JoinSnapshot {
            room: RoomKey::new("map1"),
            players: vec![],
        });
        view.apply(&ServerMsg::PlayerMoved(player(3, "map2", 1.0)));
        view.apply(&ServerMsg::PlayerMoved(player(1, "map1", 1.0)));
        assert!(view.is_empty());
    }
}
