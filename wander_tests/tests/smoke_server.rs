use wander_tests::{join, start_server, WAIT};

/// Smoke test: server starts, serves a client, answers the console, and stops.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_starts_serves_and_stops() -> anyhow::Result<()> {
    let server = start_server().await?;
    let mut ada = join(&server, "Ada").await?;

    let rooms = server.exec_console("rooms").await?;
    assert_eq!(rooms.len(), 4);
    assert!(rooms.iter().any(|l| l.starts_with("map1 ") && l.ends_with("[1 players]")));

    let who = server.exec_console("who map1").await?;
    assert_eq!(who.len(), 1);
    assert!(who[0].contains("Ada"), "{who:?}");

    assert_eq!(
        server.exec_console("who atlantis").await?,
        vec!["Unknown room 'atlantis'".to_string()]
    );
    assert_eq!(
        server.exec_console("teleport").await?,
        vec!["Unknown command 'teleport'".to_string()]
    );

    server.shutdown().await?;
    // Clients see the connection close.
    assert!(ada.recv(WAIT).await.is_err());
    Ok(())
}

/// The client console talks to a live server.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_console_commands() -> anyhow::Result<()> {
    let server = start_server().await?;
    let mut ada = join(&server, "Ada").await?;
    let _bob = join(&server, "Bob").await?;
    ada.drain(wander_tests::QUIET).await?;

    let who = ada.exec_console("who").await?;
    assert_eq!(who[0], "Room map1: 1 others");
    assert!(who[1].contains("Bob"));

    assert_eq!(ada.exec_console("rooms").await?.len(), 4);
    assert_eq!(
        ada.exec_console("room").await?,
        vec!["Usage: room <key>".to_string()]
    );
    ada.exec_console("room map2").await?;
    ada.recv_until(WAIT, |m| {
        matches!(m, wander_shared::protocol::ServerMsg::JoinSnapshot { .. })
    })
    .await?;
    let status = ada.exec_console("status").await?;
    assert!(status.contains(&"Room: map2".to_string()), "{status:?}");
    let server_line = format!("Server: {}", server.local_addr());
    assert!(status.contains(&server_line), "{status:?}");

    server.shutdown().await
}
