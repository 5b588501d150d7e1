//! Integration tests for the WebSocket transport.
//!
//! These tests start a real WebSocket server with warp, connect to it with
//! `WebSocketTransport`, and verify frames and connection events end to end.

use bayeux_transport::{Transport, TransportEvent, WebSocketTransport};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use warp::Filter;

/// Start an echo server. A text frame reading "bye" makes the server close the socket.
async fn start_echo_server() -> SocketAddr {
    let route = warp::path("echo")
        .and(warp::ws())
        .map(|ws: warp::ws::Ws| {
            ws.on_upgrade(|socket| async move {
                let (mut tx, mut rx) = socket.split();
                while let Some(Ok(message)) = rx.next().await {
                    if let Ok(text) = message.to_str() {
                        if text == "bye" {
                            let _ = tx.close().await;
                            return;
                        }
                        let reply = warp::ws::Message::text(text);
                        if tx.send(reply).await.is_err() {
                            return;
                        }
                    }
                }
            })
        });

    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Timeout waiting for transport event")
        .expect("Event channel closed")
}

#[tokio::test]
async fn test_connect_write_and_receive() {
    let addr = start_echo_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let transport = WebSocketTransport::new(format!("ws://{}/echo", addr), tx).unwrap();

    transport.open_connection();
    assert!(matches!(next_event(&mut rx).await, TransportEvent::Connected));
    assert!(transport.is_connected());

    transport.write(r#"{"channel":"/meta/handshake"}"#.to_string());

    match next_event(&mut rx).await {
        TransportEvent::Message(text) => assert_eq!(text, r#"{"channel":"/meta/handshake"}"#),
        other => panic!("Expected echoed message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ping_receives_pong() {
    let addr = start_echo_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let transport = WebSocketTransport::new(format!("ws://{}/echo", addr), tx).unwrap();

    transport.open_connection();
    assert!(matches!(next_event(&mut rx).await, TransportEvent::Connected));

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    transport.ping(
        b"keepalive".to_vec(),
        Some(Box::new(move || {
            let _ = done_tx.send(());
        })),
    );

    timeout(Duration::from_secs(5), done_rx)
        .await
        .expect("Ping completion never ran")
        .unwrap();
    assert!(matches!(next_event(&mut rx).await, TransportEvent::Pong));
}

#[tokio::test]
async fn test_remote_close_reports_disconnect() {
    let addr = start_echo_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let transport = WebSocketTransport::new(format!("ws://{}/echo", addr), tx).unwrap();

    transport.open_connection();
    assert!(matches!(next_event(&mut rx).await, TransportEvent::Connected));

    transport.write("bye".to_string());

    assert!(matches!(
        next_event(&mut rx).await,
        TransportEvent::Disconnected(_)
    ));
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_local_close_is_silent() {
    let addr = start_echo_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let transport = WebSocketTransport::new(format!("ws://{}/echo", addr), tx).unwrap();

    transport.open_connection();
    assert!(matches!(next_event(&mut rx).await, TransportEvent::Connected));

    transport.close_connection();
    assert!(!transport.is_connected());

    // Nothing further should arrive for a close we asked for
    let result = timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(result.is_err(), "Unexpected event after local close: {:?}", result);
}
