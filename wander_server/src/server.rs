//! Server implementation.
//!
//! Task layout:
//! - one acceptor task accepting TCP connections
//! - per connection, a reader task (handshake, decode, validate) and a
//!   writer task draining a bounded outbound queue
//! - one hub task that owns the [`SyncHub`] and applies events in the order
//!   they arrive on a single channel
//!
//! Only the hub task touches player state, so handlers never interleave and
//! no locks are needed. Readers forward a connection's messages in order and
//! send `Disconnected` after the last one.
//!
//! Outbound delivery is fire-and-forget: each message is encoded once and
//! `try_send`'d to every target. A full or closed queue drops the frame for
//! that connection only. Nothing larger than `max_frame_len` is queued, see
//! [`encode_frames`].

use std::{
    collections::HashMap,
    net::SocketAddr,
    time::{Duration, Instant},
};

use anyhow::Context;
use bytes::Bytes;
use tokio::{
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time,
};
use tracing::{debug, info, warn};
use wander_shared::{
    config::ServerConfig,
    net::{
        decode_payload, encode_frame, ClientId, FrameReader, FrameWriter, ReliableConn,
        ReliableListener, PROTOCOL_VERSION,
    },
    protocol::{ClientMsg, ProtocolError, ServerMsg},
    room::RoomKey,
};

use crate::{hub::SyncHub, router::Delivery};

/// Inbound channel depth between connection readers and the hub.
const EVENT_QUEUE: usize = 1024;
/// Time a new connection gets to send its `Hello`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Events consumed by the hub task.
#[derive(Debug)]
pub enum HubEvent {
    /// Handshake done; frames for this client go to `outbox`.
    Connected {
        id: ClientId,
        outbox: mpsc::Sender<Bytes>,
    },
    Message {
        id: ClientId,
        msg: ClientMsg,
    },
    Disconnected {
        id: ClientId,
    },
    /// Operator console line; the reply carries the output lines.
    Console {
        line: String,
        reply: oneshot::Sender<Vec<String>>,
    },
    Shutdown,
}

/// Bound but not yet running server.
pub struct RoomServer {
    cfg: ServerConfig,
    listener: ReliableListener,
}

impl RoomServer {
    /// Validates the config and binds the listen socket.
    pub async fn bind(cfg: ServerConfig) -> anyhow::Result<Self> {
        cfg.validate().context("invalid server config")?;
        let listener = ReliableListener::bind(&cfg.listen_addr(), cfg.max_frame_len).await?;
        Ok(Self { cfg, listener })
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.cfg
    }

    /// Starts the acceptor and hub tasks.
    pub fn spawn(self) -> anyhow::Result<ServerHandle> {
        let local_addr = self.local_addr()?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);

        let hub = Hub {
            sync: SyncHub::new(&self.cfg),
            peers: HashMap::new(),
            max_frame_len: self.cfg.max_frame_len,
        };
        let hub_task = tokio::spawn(hub.run(events_rx));
        let acceptor = tokio::spawn(accept_loop(
            self.listener,
            events_tx.clone(),
            self.cfg.outbound_queue,
        ));

        info!(
            %local_addr,
            default_room = %self.cfg.default_room,
            rooms = self.cfg.rooms.len(),
            "Server listening"
        );
        Ok(ServerHandle {
            local_addr,
            events: events_tx,
            hub: hub_task,
            acceptor,
        })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    events: mpsc::Sender<HubEvent>,
    hub: JoinHandle<()>,
    acceptor: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs a console command on the hub and returns its output.
    pub async fn exec_console(&self, line: &str) -> anyhow::Result<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(HubEvent::Console {
                line: line.to_string(),
                reply,
            })
            .await
            .context("server stopped")?;
        rx.await.context("server stopped")
    }

    /// Stops accepting, drops every connection, and waits for the hub.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.events.send(HubEvent::Shutdown).await;
        self.acceptor.abort();
        self.hub.await.context("hub task")?;
        Ok(())
    }

    /// Waits until the hub exits on its own.
    pub async fn wait(self) -> anyhow::Result<()> {
        self.hub.await.context("hub task")?;
        self.acceptor.abort();
        Ok(())
    }
}

/// Owner of all player state.
struct Hub {
    sync: SyncHub,
    peers: HashMap<ClientId, mpsc::Sender<Bytes>>,
    max_frame_len: usize,
}

impl Hub {
    async fn run(mut self, mut events: mpsc::Receiver<HubEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                HubEvent::Connected { id, outbox } => {
                    self.peers.insert(id, outbox);
                    let out = self.sync.connect(id);
                    self.deliver(out);
                }
                HubEvent::Message { id, msg } => {
                    let out = self.sync.handle(id, msg, Instant::now());
                    self.deliver(out);
                }
                HubEvent::Disconnected { id } => {
                    self.peers.remove(&id);
                    let out = self.sync.disconnect(id);
                    self.deliver(out);
                }
                HubEvent::Console { line, reply } => {
                    let (output, quit) = exec_console(&self.sync, &line);
                    let _ = reply.send(output);
                    if quit {
                        break;
                    }
                }
                HubEvent::Shutdown => break,
            }
        }
        info!(clients = self.peers.len(), "Server shutting down");
    }

    fn deliver(&self, out: Vec<Delivery>) {
        for delivery in out {
            // Split frames are queued as one chunk so a full queue drops all
            // of them or none.
            let frame = match encode_frames(&delivery.msg, self.max_frame_len) {
                Ok(mut frames) if frames.len() == 1 => frames.remove(0),
                Ok(frames) => Bytes::from(frames.concat()),
                Err(e) => {
                    warn!(kind = delivery.msg.kind(), error = %e, "Message dropped");
                    continue;
                }
            };
            for id in &delivery.targets {
                let Some(outbox) = self.peers.get(id) else {
                    continue;
                };
                match outbox.try_send(frame.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(
                            client_id = %id,
                            kind = delivery.msg.kind(),
                            "Outbound queue full, frame dropped"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                }
            }
        }
    }
}

/// Encodes `msg` into frames whose payloads fit within `max_len`.
///
/// A `JoinSnapshot` that is too large is cut down to a prefix of
/// its players that fits, and the rest follow as one `PlayerJoined` each.
/// The receiver's view ends up the same as with the whole snapshot. Any
/// other message that does not fit is an error.
pub fn encode_frames(msg: &ServerMsg, max_len: usize) -> anyhow::Result<Vec<Bytes>> {
    let frame = encode_frame(msg)?;
    let mut payload = frame.len() - 4;
    if payload <= max_len {
        return Ok(vec![frame]);
    }
    let ServerMsg::JoinSnapshot { room, players } = msg else {
        anyhow::bail!("{payload} byte payload exceeds the {max_len} byte frame limit");
    };

    let mut keep = players.len();
    let head = loop {
        keep = (keep * max_len / payload).min(keep.saturating_sub(1));
        let head = encode_frame(&ServerMsg::JoinSnapshot {
            room: room.clone(),
            players: players[..keep].to_vec(),
        })?;
        payload = head.len() - 4;
        if payload <= max_len {
            break head;
        }
        if keep == 0 {
            anyhow::bail!("empty snapshot exceeds the {max_len} byte frame limit");
        }
    };
    debug!(
        room = %room,
        in_snapshot = keep,
        announced = players.len() - keep,
        "Snapshot split to fit frame limit"
    );

    let mut frames = Vec::with_capacity(1 + players.len() - keep);
    frames.push(head);
    for player in &players[keep..] {
        let frame = encode_frame(&ServerMsg::PlayerJoined(player.clone()))?;
        if frame.len() - 4 > max_len {
            anyhow::bail!("player {} does not fit the {max_len} byte frame limit", player.id);
        }
        frames.push(frame);
    }
    Ok(frames)
}

/// Executes an operator console command. Returns output lines and whether
/// the server should stop.
pub fn exec_console(sync: &SyncHub, line: &str) -> (Vec<String>, bool) {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&cmd) = tokens.first() else {
        return (Vec::new(), false);
    };
    let router = sync.router();

    match cmd {
        "status" => {
            let mut out = vec![format!("Players: {}", router.registry().len())];
            for key in router.catalog().keys() {
                let count = router.members_of(key).len();
                if count > 0 {
                    out.push(format!("  {key}: {count}"));
                }
            }
            (out, false)
        }
        "rooms" => {
            let out = router
                .catalog()
                .summaries()
                .into_iter()
                .map(|s| {
                    format!(
                        "{} - {} ({}) [{} players]",
                        s.key,
                        s.info.name,
                        s.info.asset,
                        router.members_of(&s.key).len()
                    )
                })
                .collect();
            (out, false)
        }
        "who" => {
            let Some(room) = tokens.get(1) else {
                return (vec!["Usage: who <room>".to_string()], false);
            };
            let key = RoomKey::new(*room);
            if !router.catalog().contains(room) {
                return (vec![format!("Unknown room '{room}'")], false);
            }
            let out = router
                .registry()
                .in_room(&key)
                .map(|p| {
                    format!(
                        "  {}: {} at ({:.1}, {:.1}, {:.1})",
                        p.id, p.name, p.position.x, p.position.y, p.position.z
                    )
                })
                .collect();
            (out, false)
        }
        "quit" | "exit" => (vec!["Shutting down".to_string()], true),
        other => (vec![format!("Unknown command '{other}'")], false),
    }
}

async fn accept_loop(
    listener: ReliableListener,
    events: mpsc::Sender<HubEvent>,
    outbound_queue: usize,
) {
    loop {
        let conn = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = events.closed() => break,
        };
        match conn {
            Ok(conn) => {
                let events = events.clone();
                tokio::spawn(async move {
                    let peer = conn.peer_addr();
                    if let Err(e) = serve_connection(conn, events, outbound_queue).await {
                        warn!(%peer, error = %e, "Connection ended with error");
                    }
                });
            }
            Err(e) => warn!(error = %e, "Accept failed"),
        }
    }
}

async fn serve_connection(
    conn: ReliableConn,
    events: mpsc::Sender<HubEvent>,
    outbound_queue: usize,
) -> anyhow::Result<()> {
    let peer = conn.peer_addr();
    let (mut reader, mut writer) = conn.into_split();

    let hello = tokio::select! {
        r = time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut reader)) => r,
        _ = events.closed() => return Ok(()),
    };
    let Ok(hello) = hello else {
        warn!(%peer, "No hello before timeout, closing");
        return Ok(());
    };
    if let Err(e) = hello? {
        warn!(%peer, error = %e, "Handshake rejected");
        writer
            .send(&ServerMsg::Disconnect {
                reason: e.to_string(),
            })
            .await?;
        writer.shutdown().await?;
        return Ok(());
    }

    let id = ClientId::new_unique();
    let (outbox, rx) = mpsc::channel(outbound_queue);
    if events.send(HubEvent::Connected { id, outbox }).await.is_err() {
        return Ok(());
    }
    info!(client_id = %id, %peer, "Client connected");

    let writer_task = tokio::spawn(write_loop(writer, rx));
    let result = tokio::select! {
        r = read_loop(id, &mut reader, &events) => r,
        _ = events.closed() => Ok(()),
    };
    let _ = events.send(HubEvent::Disconnected { id }).await;
    let _ = writer_task.await;
    info!(client_id = %id, "Client disconnected");
    result
}

/// Reads the first frame. The outer error is transport failure; the inner one
/// is a protocol rejection to report to the peer.
async fn handshake(
    reader: &mut FrameReader<OwnedReadHalf>,
) -> anyhow::Result<Result<(), ProtocolError>> {
    let Some(frame) = reader.recv_frame().await? else {
        anyhow::bail!("closed before hello");
    };
    Ok(match decode_payload::<ClientMsg>(&frame) {
        Ok(ClientMsg::Hello { protocol }) if protocol == PROTOCOL_VERSION => Ok(()),
        Ok(ClientMsg::Hello { protocol }) => Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            got: protocol,
        }),
        _ => Err(ProtocolError::MissingHello),
    })
}

async fn read_loop(
    id: ClientId,
    reader: &mut FrameReader<OwnedReadHalf>,
    events: &mpsc::Sender<HubEvent>,
) -> anyhow::Result<()> {
    while let Some(frame) = reader.recv_frame().await? {
        let msg = match decode_payload::<ClientMsg>(&frame) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(client_id = %id, error = %e, "Malformed frame dropped");
                continue;
            }
        };
        let kind = msg.kind();
        let msg = match msg.validate() {
            Ok(msg) => msg,
            Err(e) => {
                warn!(client_id = %id, kind, error = %e, "Invalid message dropped");
                continue;
            }
        };
        if events.send(HubEvent::Message { id, msg }).await.is_err() {
            break;
        }
    }
    Ok(())
}

async fn write_loop(mut writer: FrameWriter<OwnedWriteHalf>, mut rx: mpsc::Receiver<Bytes>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.send_frame(&frame).await {
            debug!(error = %e, "Write failed, closing writer");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Helper for tests: bind to an ephemeral localhost port.
pub async fn bind_ephemeral() -> anyhow::Result<RoomServer> {
    let mut cfg = ServerConfig::default();
    cfg.apply_addr("127.0.0.1:0")?;
    RoomServer::bind(cfg).await
}
