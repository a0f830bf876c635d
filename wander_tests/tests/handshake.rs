//! Handshake and transport edge cases, driven over raw connections.

use wander_shared::{
    config::ServerConfig,
    net::{ReliableConn, MAX_FRAME_LEN},
    protocol::{ClientMsg, ServerMsg},
    room::RoomKey,
};
use wander_tests::{
    join, raw_connect, raw_recv_until, start_server, start_server_with, QUIET, WAIT,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn welcome_carries_identity_and_catalog() -> anyhow::Result<()> {
    let server = start_server().await?;
    let (mut conn, welcome) = raw_connect(&server).await?;

    let (id, player, default_room, rooms) = match welcome {
        ServerMsg::Welcome {
            id,
            player,
            default_room,
            rooms,
        } => (id, player, default_room, rooms),
        other => panic!("expected welcome, got {other:?}"),
    };
    assert_eq!(player.id, id);
    assert_eq!(player.room, default_room);
    assert_eq!(default_room, RoomKey::new("map1"));
    assert_eq!(rooms.len(), 4);

    // The snapshot follows the welcome.
    let snapshot = raw_recv_until(&mut conn, |_| true).await?;
    assert!(matches!(snapshot, ServerMsg::JoinSnapshot { ref room, .. } if *room == default_room));

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn version_mismatch_is_refused() -> anyhow::Result<()> {
    let server = start_server().await?;
    let mut conn = ReliableConn::connect(server.local_addr(), MAX_FRAME_LEN).await?;
    conn.send(&ClientMsg::Hello { protocol: 999 }).await?;

    match conn.recv_timeout::<ServerMsg>(WAIT).await? {
        Some(ServerMsg::Disconnect { reason }) => assert!(reason.contains("999"), "{reason}"),
        other => panic!("expected disconnect, got {other:?}"),
    }
    // The server hangs up afterwards.
    assert!(conn.recv_timeout::<ServerMsg>(WAIT).await.is_err());

    let status = server.exec_console("status").await?;
    assert_eq!(status[0], "Players: 0");
    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn first_message_must_be_hello() -> anyhow::Result<()> {
    let server = start_server().await?;
    let mut conn = ReliableConn::connect(server.local_addr(), MAX_FRAME_LEN).await?;
    conn.send(&ClientMsg::Chat { text: "hi".into() }).await?;

    let reply = conn.recv_timeout::<ServerMsg>(WAIT).await?;
    assert!(matches!(reply, Some(ServerMsg::Disconnect { .. })), "{reply:?}");
    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_frame_is_dropped_and_connection_kept() -> anyhow::Result<()> {
    let server = start_server().await?;
    let (mut conn, _) = raw_connect(&server).await?;
    raw_recv_until(&mut conn, |m| matches!(m, ServerMsg::JoinSnapshot { .. })).await?;

    let garbage = b"{not json";
    let mut frame = (garbage.len() as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(garbage);
    conn.writer.send_frame(&frame).await?;

    // Unknown message types are malformed too.
    conn.writer
        .send_frame(&{
            let body = br#"{"type":"teleport","to":"moon"}"#;
            let mut f = (body.len() as u32).to_be_bytes().to_vec();
            f.extend_from_slice(body);
            f
        })
        .await?;

    conn.send(&ClientMsg::Chat {
        text: "still here".into(),
    })
    .await?;
    let echoed = raw_recv_until(&mut conn, |m| matches!(m, ServerMsg::Chat(_))).await?;
    assert!(matches!(echoed, ServerMsg::Chat(ref line) if line.text == "still here"));

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_messages_are_ignored() -> anyhow::Result<()> {
    let server = start_server().await?;
    let (mut conn, _) = raw_connect(&server).await?;
    raw_recv_until(&mut conn, |m| matches!(m, ServerMsg::JoinSnapshot { .. })).await?;

    // Blank chat and an empty room key fail validation and produce nothing.
    conn.send(&ClientMsg::Chat { text: "   ".into() }).await?;
    conn.send(&ClientMsg::SwitchRoom { room: "".into() }).await?;
    conn.send(&ClientMsg::Chat { text: "ok".into() }).await?;

    let next = raw_recv_until(&mut conn, |_| true).await?;
    assert!(matches!(next, ServerMsg::Chat(ref line) if line.text == "ok"), "{next:?}");

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_frame_drops_only_the_sender() -> anyhow::Result<()> {
    let server = start_server().await?;
    let mut bob = join(&server, "Bob").await?;
    let (mut conn, welcome) = raw_connect(&server).await?;
    let id = match welcome {
        ServerMsg::Welcome { id, .. } => id,
        other => panic!("expected welcome, got {other:?}"),
    };
    raw_recv_until(&mut conn, |m| matches!(m, ServerMsg::JoinSnapshot { .. })).await?;
    bob.recv_until(WAIT, |m| matches!(m, ServerMsg::PlayerJoined(p) if p.id == id))
        .await?;

    // A length header past the limit; no payload needs to follow.
    let header = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
    conn.writer.send_frame(&header).await?;

    bob.recv_until(WAIT, |m| matches!(m, ServerMsg::PlayerLeft { id: gone } if *gone == id))
        .await?;
    assert!(bob.remotes.is_empty());
    let later = bob.drain(QUIET).await?;
    assert!(!later
        .iter()
        .any(|m| matches!(m, ServerMsg::PlayerLeft { id: gone } if *gone == id)));
    assert!(conn.recv_timeout::<ServerMsg>(WAIT).await.is_err());

    bob.say("still here").await?;
    let line = bob
        .recv_until(WAIT, |m| matches!(m, ServerMsg::Chat(_)))
        .await?;
    assert!(matches!(line, ServerMsg::Chat(ref l) if l.text == "still here"));

    let status = server.exec_console("status").await?;
    assert_eq!(status[0], "Players: 1");
    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_connection_is_closed_on_shutdown() -> anyhow::Result<()> {
    let server = start_server().await?;
    let mut conn = ReliableConn::connect(server.local_addr(), MAX_FRAME_LEN).await?;
    tokio::time::sleep(QUIET).await;

    server.shutdown().await?;
    // Never sent a hello, yet the server does not keep the socket open.
    assert!(conn.recv_timeout::<ServerMsg>(WAIT).await.is_err());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crowded_room_snapshot_is_split_to_fit() -> anyhow::Result<()> {
    let mut cfg = ServerConfig::default();
    cfg.max_frame_len = 1024;
    let server = start_server_with(cfg).await?;

    let mut crowd = Vec::new();
    for i in 0..16 {
        crowd.push(join(&server, &format!("Walker {i:0>25}")).await?);
    }
    let mut expected: Vec<_> = crowd.iter().map(|c| c.client_id).collect();
    expected.sort();

    let mut newcomer = join(&server, "Newcomer").await?;
    newcomer.drain(QUIET).await?;
    let mut seen = newcomer.remotes.ids();
    seen.sort();
    assert_eq!(seen, expected);
    let named = newcomer
        .remotes
        .iter()
        .filter(|r| r.player.name.starts_with("Walker "))
        .count();
    assert_eq!(named, 16);

    server.shutdown().await
}
