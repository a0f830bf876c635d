//! Client implementation.
//!
//! The client maintains:
//! - One reliable stream to the server (handshake + all sync traffic)
//! - Its own player record as last confirmed by the server
//! - A view of the other players in its room
//! - A local walker producing per-tick movement
//! - A console for user commands

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, warn};
use wander_shared::{
    chat::ChatLine,
    config::ClientConfig,
    net::{ClientId, ReliableConn, PROTOCOL_VERSION},
    player::Player,
    protocol::{ClientMsg, ServerMsg},
    room::{RoomKey, RoomSummary},
};

use crate::{
    input::{InputState, Walker},
    view::RemotePlayers,
};

/// Client connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Welcomed, waiting for the first room snapshot.
    Connected,
    /// In a room with a current snapshot.
    InRoom(RoomKey),
    /// Room switch requested; movement is held until the new snapshot.
    Switching,
    /// Server closed the connection or rejected us.
    Disconnected,
}

/// Headless game client.
pub struct WanderClient {
    pub client_id: ClientId,
    pub state: ClientState,
    /// Own record as last reported by the server.
    pub me: Player,
    pub rooms: Vec<RoomSummary>,
    pub remotes: RemotePlayers,
    pub walker: Walker,
    /// Chat lines received, oldest first.
    pub chat_log: Vec<ChatLine>,
    conn: ReliableConn,
    tick: u32,
    /// Switch requests still waiting for their snapshot.
    pending_switches: u32,
}

impl WanderClient {
    /// Connects to a server and performs the handshake.
    pub async fn connect(cfg: &ClientConfig) -> anyhow::Result<Self> {
        let server_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        info!(server = %server_addr, "Connecting to server");

        let mut conn = ReliableConn::connect(server_addr, cfg.max_frame_len).await?;
        conn.send(&ClientMsg::Hello {
            protocol: PROTOCOL_VERSION,
        })
        .await?;

        let welcome = conn
            .recv::<ServerMsg>()
            .await?
            .context("server closed during handshake")?;
        let (client_id, me, rooms) = match welcome {
            ServerMsg::Welcome {
                id, player, rooms, ..
            } => (id, player, rooms),
            ServerMsg::Disconnect { reason } => anyhow::bail!("server refused: {reason}"),
            other => anyhow::bail!("expected Welcome, got {other:?}"),
        };
        info!(client_id = %client_id, name = %me.name, room = %me.room, "Connected to server");

        let mut client = Self {
            client_id,
            state: ClientState::Connected,
            walker: Walker {
                position: me.position,
                yaw: me.rotation,
            },
            me,
            rooms,
            remotes: RemotePlayers::new(client_id),
            chat_log: Vec::new(),
            conn,
            tick: 0,
            pending_switches: 0,
        };

        if !cfg.player_name.is_empty() {
            client.rename(&cfg.player_name).await?;
        }
        Ok(client)
    }

    /// Sends a raw protocol message.
    pub async fn send(&mut self, msg: &ClientMsg) -> anyhow::Result<()> {
        self.conn.send(msg).await
    }

    /// Receives one message within `timeout` and applies it to local state.
    /// Returns `Ok(None)` on timeout.
    pub async fn recv(&mut self, timeout: Duration) -> anyhow::Result<Option<ServerMsg>> {
        if self.state == ClientState::Disconnected {
            anyhow::bail!("not connected");
        }
        let msg = match self.conn.recv_timeout::<ServerMsg>(timeout).await {
            Ok(msg) => msg,
            Err(e) => {
                self.state = ClientState::Disconnected;
                return Err(e);
            }
        };
        if let Some(msg) = &msg {
            self.apply(msg);
        }
        Ok(msg)
    }

    /// Receives messages until one matches `pred` or `timeout` passes with no
    /// traffic. Every received message is applied along the way.
    pub async fn recv_until<F>(
        &mut self,
        timeout: Duration,
        mut pred: F,
    ) -> anyhow::Result<ServerMsg>
    where
        F: FnMut(&ServerMsg) -> bool,
    {
        loop {
            match self.recv(timeout).await? {
                Some(msg) if pred(&msg) => return Ok(msg),
                Some(_) => continue,
                None => anyhow::bail!("timed out waiting for message"),
            }
        }
    }

    /// Drains everything that arrives before a quiet period of `idle`.
    pub async fn drain(&mut self, idle: Duration) -> anyhow::Result<Vec<ServerMsg>> {
        let mut out = Vec::new();
        while let Some(msg) = self.recv(idle).await? {
            out.push(msg);
        }
        Ok(out)
    }

    fn apply(&mut self, msg: &ServerMsg) {
        self.remotes.apply(msg);
        match msg {
            ServerMsg::JoinSnapshot { room, players } => {
                debug!(room = %room, others = players.len(), "Room snapshot");
                self.me.room = room.clone();
                let spawn = self
                    .rooms
                    .iter()
                    .find(|r| &r.key == room)
                    .map(|r| r.info.spawn)
                    .unwrap_or_default();
                self.me.position = spawn;
                self.walker.teleport(spawn);
                // Every switch request is answered by exactly one snapshot,
                // and the initial join by one more.
                if self.state != ClientState::Connected {
                    self.pending_switches = self.pending_switches.saturating_sub(1);
                }
                self.state = if self.pending_switches == 0 {
                    ClientState::InRoom(room.clone())
                } else {
                    ClientState::Switching
                };
            }
            ServerMsg::PlayerMoved(p) if p.id == self.client_id => {
                // Echo of our own rename.
                self.me.name = p.name.clone();
            }
            ServerMsg::Chat(line) => {
                info!(from = %line.name, text = %line.text, "Chat");
                self.chat_log.push(line.clone());
            }
            ServerMsg::Disconnect { reason } => {
                warn!(reason = %reason, "Disconnected by server");
                self.state = ClientState::Disconnected;
            }
            _ => {}
        }
    }

    /// Advances the walker one tick and sends the resulting pose. Does
    /// nothing outside a room, so a pose from the old room never reaches
    /// the new one.
    pub async fn tick(&mut self, input: InputState, dt: f32) -> anyhow::Result<()> {
        if !matches!(self.state, ClientState::InRoom(_)) {
            return Ok(());
        }
        self.walker.step(input, dt);
        self.me.position = self.walker.position;
        self.me.rotation = self.walker.yaw;
        let msg = self.walker.movement();
        self.send(&msg).await?;
        self.tick += 1;
        Ok(())
    }

    /// Requests a room switch. Movement pauses until the answering snapshot.
    pub async fn switch_room(&mut self, room: &str) -> anyhow::Result<()> {
        if room.trim().is_empty() {
            anyhow::bail!("empty room key");
        }
        self.send(&ClientMsg::SwitchRoom {
            room: room.to_string(),
        })
        .await?;
        self.pending_switches += 1;
        if matches!(self.state, ClientState::InRoom(_)) {
            self.state = ClientState::Switching;
        }
        Ok(())
    }

    pub async fn say(&mut self, text: &str) -> anyhow::Result<()> {
        self.send(&ClientMsg::Chat {
            text: text.to_string(),
        })
        .await
    }

    pub async fn rename(&mut self, name: &str) -> anyhow::Result<()> {
        self.send(&ClientMsg::Rename {
            name: name.to_string(),
        })
        .await
    }

    /// Executes a console command.
    pub async fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let line = line.trim();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&cmd) = tokens.first() else {
            return Ok(Vec::new());
        };

        match cmd {
            "say" => {
                let text = tokens[1..].join(" ");
                if text.is_empty() {
                    return Ok(vec!["Usage: say <message>".to_string()]);
                }
                self.say(&text).await?;
                Ok(vec![])
            }
            "name" => {
                let name = tokens[1..].join(" ");
                if name.is_empty() {
                    return Ok(vec![format!("Name: {}", self.me.name)]);
                }
                self.rename(&name).await?;
                Ok(vec![])
            }
            "room" => {
                let Some(room) = tokens.get(1) else {
                    return Ok(vec!["Usage: room <key>".to_string()]);
                };
                self.switch_room(room).await?;
                Ok(vec![format!("Requested room '{room}'")])
            }
            "rooms" => Ok(self
                .rooms
                .iter()
                .map(|r| format!("{} - {}: {}", r.key, r.info.name, r.info.description))
                .collect()),
            "who" => {
                let mut out = vec![format!("Room {}: {} others", self.me.room, self.remotes.len())];
                for remote in self.remotes.iter() {
                    let p = &remote.player;
                    out.push(format!(
                        "  {}: {} at ({:.1}, {:.1}, {:.1})",
                        p.id, p.name, p.position.x, p.position.y, p.position.z
                    ));
                }
                Ok(out)
            }
            "status" => Ok(vec![
                format!("State: {:?}", self.state),
                format!("Client ID: {}", self.client_id),
                format!("Server: {}", self.server_peer()),
                format!("Name: {}", self.me.name),
                format!("Room: {}", self.me.room),
                format!("Tick: {}", self.tick),
                format!("Others in room: {}", self.remotes.len()),
            ]),
            other => Ok(vec![format!("Unknown command '{other}'")]),
        }
    }

    /// Returns the server address.
    pub fn server_peer(&self) -> SocketAddr {
        self.conn.peer_addr()
    }
}
