//! WebSocket endpoint tests against a live listener.

use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, Stream, StreamExt};
use group_hub::Hub;
use group_hub::transport::{GroupServer, WsConnection};
use tokio::io::duplex;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::{WebSocketStream, connect_async};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

async fn next_text<S>(ws: &mut S) -> anyhow::Result<String>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let message = timeout(WAIT, ws.next())
        .await?
        .context("stream ended")??;
    Ok(message.to_text()?.to_string())
}

async fn wait_for_members(hub: &Hub, group: &str, count: usize) -> anyhow::Result<()> {
    timeout(WAIT, async {
        loop {
            let current = hub
                .snapshot()
                .members(group)
                .map_or(0, <[_]>::len);
            if current == count {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .with_context(|| format!("{group} never reached {count} members"))
}

#[tokio::test]
async fn test_clients_receive_id_and_relayed_messages() -> anyhow::Result<()> {
    let hub = Hub::new();
    let root = CancellationToken::new();
    let finished = hub.run_lifecycle(root.clone());

    let server = GroupServer::builder().bind(hub.clone()).await?;
    let url = server.ws_url("room1");
    let serving = tokio::spawn(server.run(root.child_token()));

    let (mut alice, _) = connect_async(url.as_str()).await?;
    let greeting = next_text(&mut alice).await?;
    let alice_id = greeting
        .strip_prefix("connection_id: ")
        .context("missing id greeting")?
        .to_string();

    let (mut bob, _) = connect_async(url.as_str()).await?;
    let greeting = next_text(&mut bob).await?;
    assert!(greeting.starts_with("connection_id: "));
    assert_ne!(greeting.trim_start_matches("connection_id: "), alice_id);

    wait_for_members(&hub, "room1", 2).await?;
    assert!(hub.snapshot().contains("room1", &alice_id));

    alice.send(Message::text("hello")).await?;
    assert_eq!(next_text(&mut alice).await?, "hello");
    assert_eq!(next_text(&mut bob).await?, "hello");

    alice.close(None).await?;
    wait_for_members(&hub, "room1", 1).await?;
    assert!(!hub.snapshot().contains("room1", &alice_id));

    root.cancel();
    timeout(WAIT, finished.wait()).await?;
    timeout(WAIT, serving).await???;

    assert!(hub.snapshot().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_path_without_group_is_not_found() -> anyhow::Result<()> {
    let hub = Hub::new();
    let root = CancellationToken::new();

    let server = GroupServer::builder().bind(hub.clone()).await?;
    let url = format!("ws://{}/elsewhere/room1", server.local_addr());
    let serving = tokio::spawn(server.run(root.child_token()));

    match connect_async(url.as_str()).await {
        Err(WsError::Http(response)) => {
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
        Err(other) => anyhow::bail!("unexpected error: {other}"),
        Ok(_) => anyhow::bail!("handshake should have been refused"),
    }

    assert_eq!(hub.group_count(), 0);

    root.cancel();
    timeout(WAIT, serving).await???;
    Ok(())
}

#[tokio::test]
async fn test_groups_are_isolated() -> anyhow::Result<()> {
    let hub = Hub::new();
    let root = CancellationToken::new();

    let server = GroupServer::builder().bind(hub.clone()).await?;
    let room1 = server.ws_url("room1");
    let room2 = server.ws_url("room2");
    let serving = tokio::spawn(server.run(root.child_token()));

    let (mut one, _) = connect_async(room1.as_str()).await?;
    let (mut two, _) = connect_async(room2.as_str()).await?;
    next_text(&mut one).await?;
    next_text(&mut two).await?;

    one.send(Message::text("only room1")).await?;
    assert_eq!(next_text(&mut one).await?, "only room1");

    two.send(Message::text("only room2")).await?;
    assert_eq!(next_text(&mut two).await?, "only room2");

    let snapshot = hub.snapshot();
    assert_eq!(snapshot.group_count(), 2);
    assert_eq!(snapshot.connection_count(), 2);

    root.cancel();
    timeout(WAIT, serving).await???;
    hub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_completes_with_peer_that_stopped_reading() -> anyhow::Result<()> {
    let hub = Hub::new();
    let root = CancellationToken::new();
    let finished = hub.run_lifecycle(root.clone());

    let (server_io, client_io) = duplex(1024);
    let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let _stalled = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

    let client = hub.admit(WsConnection::new(server), "room1", "c1")?;
    let (_events, done) = client.start_receiving(root.child_token())?;

    let sender = hub.clone();
    let delivery = tokio::spawn(async move {
        sender.broadcast("room1", vec![b'x'; 64 * 1024]).await
    });
    sleep(Duration::from_millis(50)).await;
    assert!(!delivery.is_finished());

    root.cancel();
    timeout(WAIT, finished.wait())
        .await
        .context("hub completion never fired")?;

    assert!(done.is_complete());
    assert!(client.is_closed());
    assert!(hub.snapshot().is_empty());

    let delivery = timeout(WAIT, delivery).await??;
    assert_eq!(delivery.attempted, 1);
    assert_eq!(delivery.delivered(), 0);
    Ok(())
}
