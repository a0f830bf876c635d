//! Helpers shared by the socket-level tests: start a server on an ephemeral
//! port and bring clients into a known state.

use std::time::Duration;

use wander_client::WanderClient;
use wander_server::{server::bind_ephemeral, RoomServer, ServerHandle};
use wander_shared::prelude::*;

/// Upper bound on waiting for an expected message.
pub const WAIT: Duration = Duration::from_secs(2);
/// Silence long enough to conclude nothing else is coming.
pub const QUIET: Duration = Duration::from_millis(150);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Starts a default-config server on `127.0.0.1:0`.
pub async fn start_server() -> anyhow::Result<ServerHandle> {
    init_tracing();
    bind_ephemeral().await?.spawn()
}

/// Starts a server with `cfg` on `127.0.0.1:0`.
pub async fn start_server_with(mut cfg: ServerConfig) -> anyhow::Result<ServerHandle> {
    init_tracing();
    cfg.apply_addr("127.0.0.1:0")?;
    RoomServer::bind(cfg).await?.spawn()
}

/// Connects a client and waits until it is in its starting room. With a
/// non-empty `name`, also waits for the rename to be confirmed.
pub async fn join(server: &ServerHandle, name: &str) -> anyhow::Result<WanderClient> {
    let cfg = ClientConfig {
        server_addr: server.local_addr().to_string(),
        player_name: name.to_string(),
        ..Default::default()
    };
    let mut client = WanderClient::connect(&cfg).await?;
    client
        .recv_until(WAIT, |m| matches!(m, ServerMsg::JoinSnapshot { .. }))
        .await?;
    if !name.is_empty() {
        let id = client.client_id;
        client
            .recv_until(WAIT, move |m| matches!(m, ServerMsg::PlayerMoved(p) if p.id == id))
            .await?;
    }
    Ok(client)
}

/// Switches `client` to `room` and waits for the new snapshot.
pub async fn enter(client: &mut WanderClient, room: &str) -> anyhow::Result<ServerMsg> {
    client.switch_room(room).await?;
    client
        .recv_until(WAIT, |m| matches!(m, ServerMsg::JoinSnapshot { .. }))
        .await
}

/// Opens a bare connection and completes the handshake by hand, returning
/// the connection and the `Welcome`.
pub async fn raw_connect(server: &ServerHandle) -> anyhow::Result<(ReliableConn, ServerMsg)> {
    let mut conn = ReliableConn::connect(server.local_addr(), MAX_FRAME_LEN).await?;
    conn.send(&ClientMsg::Hello {
        protocol: PROTOCOL_VERSION,
    })
    .await?;
    let welcome = conn
        .recv_timeout::<ServerMsg>(WAIT)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no welcome"))?;
    Ok((conn, welcome))
}

/// Reads from a bare connection until `pred` matches.
pub async fn raw_recv_until<F>(conn: &mut ReliableConn, mut pred: F) -> anyhow::Result<ServerMsg>
where
    F: FnMut(&ServerMsg) -> bool,
{
    loop {
        match conn.recv_timeout::<ServerMsg>(WAIT).await? {
            Some(msg) if pred(&msg) => return Ok(msg),
            Some(_) => continue,
            None => anyhow::bail!("timed out waiting for message"),
        }
    }
}
