//! Sync protocol dispatch.
//!
//! One handler per inbound event type. Each call runs to completion against
//! the registry before the next event is looked at, and returns the
//! deliveries it produced. Nothing here touches sockets.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use wander_shared::{
    chat::{ChatLine, RateLimiter},
    config::ServerConfig,
    math::Vec3,
    net::ClientId,
    player::PlayerPatch,
    protocol::{ClientMsg, ServerMsg},
};

use crate::router::{push_delivery, Delivery, RoomRouter};

/// Registry, router and per-connection chat limits behind one event API.
#[derive(Debug)]
pub struct SyncHub {
    router: RoomRouter,
    limiters: HashMap<ClientId, RateLimiter>,
    chat_rate_messages: u32,
    chat_rate_window: Duration,
}

impl SyncHub {
    pub fn new(cfg: &ServerConfig) -> Self {
        Self {
            router: RoomRouter::from_config(cfg),
            limiters: HashMap::new(),
            chat_rate_messages: cfg.chat_rate_messages,
            chat_rate_window: Duration::from_secs(cfg.chat_rate_window_secs),
        }
    }

    pub fn router(&self) -> &RoomRouter {
        &self.router
    }

    /// A connection finished its handshake: register it, welcome it, and run
    /// the initial room join.
    pub fn connect(&mut self, id: ClientId) -> Vec<Delivery> {
        let player = self.router.registry_mut().register(id);
        self.limiters.insert(
            id,
            RateLimiter::new(self.chat_rate_messages, self.chat_rate_window),
        );

        let welcome = ServerMsg::Welcome {
            id,
            player,
            default_room: self.router.registry().default_room().clone(),
            rooms: self.router.catalog().summaries(),
        };
        let mut out = vec![Delivery::to(id, welcome)];
        out.extend(self.router.join_initial(id));
        out
    }

    /// Connection gone. Safe to call more than once.
    pub fn disconnect(&mut self, id: ClientId) -> Vec<Delivery> {
        self.limiters.remove(&id);
        self.router.leave(id)
    }

    /// Dispatches one validated client message.
    pub fn handle(&mut self, id: ClientId, msg: ClientMsg, now: Instant) -> Vec<Delivery> {
        match msg {
            ClientMsg::Movement { position, rotation } => self.on_movement(id, position, rotation),
            ClientMsg::SwitchRoom { room } => self.router.switch_room(id, &room),
            ClientMsg::Chat { text } => self.on_chat(id, &text, now),
            ClientMsg::Rename { name } => self.on_rename(id, name),
            ClientMsg::Hello { .. } => {
                debug!(client_id = %id, "Repeated hello ignored");
                Vec::new()
            }
        }
    }

    fn on_movement(&mut self, id: ClientId, position: Vec3, rotation: f32) -> Vec<Delivery> {
        if !self
            .router
            .registry_mut()
            .update(id, PlayerPatch::pose(position, rotation))
        {
            return Vec::new();
        }
        let Some(player) = self.router.registry().get(id).cloned() else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(1);
        push_delivery(
            &mut out,
            self.router.others_in(&player.room, id),
            ServerMsg::PlayerMoved(player),
        );
        out
    }

    fn on_chat(&mut self, id: ClientId, text: &str, now: Instant) -> Vec<Delivery> {
        let Some(player) = self.router.registry().get(id) else {
            return Vec::new();
        };
        if let Some(limiter) = self.limiters.get_mut(&id) {
            if !limiter.record_message(now) {
                warn!(client_id = %id, "Chat rate limited, message dropped");
                return Vec::new();
            }
        }
        let line = ChatLine::new(id, &player.name, text);
        let room = player.room.clone();
        debug!(client_id = %id, room = %room, "Chat relayed");

        let mut out = Vec::with_capacity(1);
        push_delivery(
            &mut out,
            self.router.members_of(&room).into_iter().collect(),
            ServerMsg::Chat(line),
        );
        out
    }

    /// Renames reuse `PlayerMoved`, sent to the whole room so every label,
    /// the sender's included, refreshes.
    fn on_rename(&mut self, id: ClientId, name: String) -> Vec<Delivery> {
        if !self.router.registry_mut().update(id, PlayerPatch::name(name)) {
            return Vec::new();
        }
        let Some(player) = self.router.registry().get(id).cloned() else {
            return Vec::new();
        };
        debug!(client_id = %id, name = %player.name, "Player renamed");
        let mut out = Vec::with_capacity(1);
        push_delivery(
            &mut out,
            self.router.members_of(&player.room).into_iter().collect(),
            ServerMsg::PlayerMoved(player),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::tests::inbox;

    fn hub() -> SyncHub {
        SyncHub::new(&ServerConfig::default())
    }

    fn movement(x: f32) -> ClientMsg {
        ClientMsg::Movement {
            position: Vec3::new(x, 0.0, 0.0),
            rotation: 0.25,
        }
    }

    #[test]
    fn connect_sends_welcome_before_snapshot() {
        let mut h = hub();
        h.connect(ClientId(2));
        let out = h.connect(ClientId(1));

        let a = inbox(&out, ClientId(1));
        assert_eq!(a.len(), 2);
        match &a[0] {
            ServerMsg::Welcome {
                id,
                player,
                default_room,
                rooms,
            } => {
                assert_eq!(*id, ClientId(1));
                assert_eq!(player.name, "Player 1");
                assert_eq!(default_room.as_str(), "map1");
                assert_eq!(rooms.len(), 4);
            }
            other => panic!("expected welcome, got {other:?}"),
        }
        assert!(matches!(&a[1], ServerMsg::JoinSnapshot { players, .. } if players.len() == 1));
        assert_eq!(inbox(&out, ClientId(2)).len(), 1);
    }

    #[test]
    fn movement_reaches_room_mates_only() {
        let mut h = hub();
        let now = Instant::now();
        for n in 1..=3 {
            h.connect(ClientId(n));
        }
        h.handle(ClientId(3), ClientMsg::SwitchRoom { room: "map2".into() }, now);

        let out = h.handle(ClientId(1), movement(4.0), now);
        let b = inbox(&out, ClientId(2));
        assert_eq!(b.len(), 1);
        match &b[0] {
            ServerMsg::PlayerMoved(p) => {
                assert_eq!(p.id, ClientId(1));
                assert_eq!(p.position, Vec3::new(4.0, 0.0, 0.0));
                assert_eq!(p.rotation, 0.25);
            }
            other => panic!("expected move, got {other:?}"),
        }
        assert!(inbox(&out, ClientId(3)).is_empty());
        assert!(inbox(&out, ClientId(1)).is_empty(), "sender is not echoed");
    }

    #[test]
    fn stale_movement_after_disconnect_is_noop() {
        let mut h = hub();
        let now = Instant::now();
        h.connect(ClientId(1));
        h.connect(ClientId(2));

        let out = h.disconnect(ClientId(1));
        assert_eq!(
            inbox(&out, ClientId(2)),
            vec![ServerMsg::PlayerLeft { id: ClientId(1) }]
        );

        assert!(h.handle(ClientId(1), movement(1.0), now).is_empty());
        assert!(h.router().registry().get(ClientId(1)).is_none());
        assert!(h.disconnect(ClientId(1)).is_empty());
    }

    #[test]
    fn chat_goes_to_whole_room_including_sender() {
        let mut h = hub();
        let now = Instant::now();
        for n in 1..=3 {
            h.connect(ClientId(n));
        }
        h.handle(ClientId(3), ClientMsg::SwitchRoom { room: "room1".into() }, now);

        let out = h.handle(ClientId(1), ClientMsg::Chat { text: "salut".into() }, now);
        for n in [1, 2] {
            let got = inbox(&out, ClientId(n));
            assert_eq!(got.len(), 1);
            match &got[0] {
                ServerMsg::Chat(line) => {
                    assert_eq!(line.id, ClientId(1));
                    assert_eq!(line.name, "Player 1");
                    assert_eq!(line.text, "salut");
                }
                other => panic!("expected chat, got {other:?}"),
            }
        }
        assert!(inbox(&out, ClientId(3)).is_empty());
    }

    #[test]
    fn chat_rate_limit_is_per_connection() {
        let mut cfg = ServerConfig::default();
        cfg.chat_rate_messages = 2;
        let mut h = SyncHub::new(&cfg);
        let now = Instant::now();
        h.connect(ClientId(1));
        h.connect(ClientId(2));

        let say = |t: &str| ClientMsg::Chat { text: t.into() };
        assert!(!h.handle(ClientId(1), say("a"), now).is_empty());
        assert!(!h.handle(ClientId(1), say("b"), now).is_empty());
        assert!(h.handle(ClientId(1), say("c"), now).is_empty());
        // Another connection is unaffected.
        assert!(!h.handle(ClientId(2), say("d"), now).is_empty());
        // The window slides.
        let later = now + Duration::from_secs(cfg.chat_rate_window_secs);
        assert!(!h.handle(ClientId(1), say("e"), later).is_empty());
    }

    #[test]
    fn rename_refreshes_label_for_whole_room() {
        let mut h = hub();
        let now = Instant::now();
        h.connect(ClientId(1));
        h.connect(ClientId(2));
        h.handle(ClientId(1), movement(2.0), now);

        let out = h.handle(ClientId(1), ClientMsg::Rename { name: "Ada".into() }, now);
        for n in [1, 2] {
            let got = inbox(&out, ClientId(n));
            assert_eq!(got.len(), 1);
            assert!(matches!(
                &got[0],
                ServerMsg::PlayerMoved(p) if p.name == "Ada" && p.position.x == 2.0
            ));
        }
        assert_eq!(h.router().registry().get(ClientId(1)).unwrap().name, "Ada");

        // Chat after a rename carries the new name.
        let out = h.handle(ClientId(1), ClientMsg::Chat { text: "hi".into() }, now);
        assert!(matches!(&inbox(&out, ClientId(2))[0], ServerMsg::Chat(l) if l.name == "Ada"));
    }

    #[test]
    fn switch_request_goes_through_router() {
        let mut h = hub();
        let now = Instant::now();
        h.connect(ClientId(1));
        h.connect(ClientId(2));
        let out = h.handle(ClientId(1), ClientMsg::SwitchRoom { room: "map2".into() }, now);
        assert_eq!(
            inbox(&out, ClientId(2)),
            vec![ServerMsg::PlayerLeft { id: ClientId(1) }]
        );
        assert!(matches!(
            &inbox(&out, ClientId(1))[0],
            ServerMsg::JoinSnapshot { room, players } if room.as_str() == "map2" && players.is_empty()
        ));
    }
}
