//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on an OS-assigned port and connect a real
//! `tokio-tungstenite` client, so the handshake, the room-id check and the
//! framing are all exercised over TCP.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use roomgate_protocol::{close, ProtocolError};
use roomgate_transport::{TransportError, WebSocketTransport};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn bind() -> (WebSocketTransport, String) {
    let transport = WebSocketTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport.local_addr().expect("local addr").to_string();
    (transport, addr)
}

async fn connect(addr: &str, path: &str) -> Result<ClientWs, tungstenite::Error> {
    tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
        .await
        .map(|(ws, _)| ws)
}

#[tokio::test]
async fn test_upgrade_extracts_room_id_and_exchanges_frames() {
    let (transport, addr) = bind().await;

    let server = tokio::spawn(async move {
        let pending = transport.accept().await.expect("should accept");
        pending.upgrade(8, HANDSHAKE_TIMEOUT).await
    });

    let mut client = connect(&addr, "/12345678").await.expect("client should connect");
    let (room_id, conn) = server
        .await
        .expect("task should complete")
        .expect("upgrade should succeed");
    assert_eq!(room_id.as_str(), "12345678");

    let (mut writer, mut reader) = conn.into_split();

    // --- Server sends, client receives ---
    writer.send_binary(b"hello from server").await.expect("send");
    let msg = client.next().await.unwrap().unwrap();
    assert!(msg.is_binary());
    assert_eq!(msg.into_data().as_ref(), b"hello from server");

    // --- Client sends, server receives ---
    client
        .send(Message::Binary(b"hello from client".to_vec().into()))
        .await
        .unwrap();
    let received = reader.recv().await.expect("recv should succeed");
    assert_eq!(received, b"hello from client");

    // Text frames arrive as their UTF-8 bytes.
    client.send(Message::Text("hi".into())).await.unwrap();
    assert_eq!(reader.recv().await.unwrap(), b"hi");
}

#[tokio::test]
async fn test_upgrade_rejects_wrong_room_id_length_with_400() {
    let (transport, addr) = bind().await;

    let server = tokio::spawn(async move {
        let pending = transport.accept().await.expect("should accept");
        pending.upgrade(8, HANDSHAKE_TIMEOUT).await
    });

    let err = connect(&addr, "/123").await.expect_err("should be refused");
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 400),
        other => panic!("expected HTTP 400, got {other:?}"),
    }

    let result = server.await.expect("task should complete");
    assert!(matches!(
        result,
        Err(TransportError::Rejected(ProtocolError::InvalidRoomId {
            expected: 8,
            actual: 3,
        }))
    ));
}

#[tokio::test]
async fn test_upgrade_rejects_overlong_room_id() {
    let (transport, addr) = bind().await;

    let server = tokio::spawn(async move {
        let pending = transport.accept().await.expect("should accept");
        pending.upgrade(8, HANDSHAKE_TIMEOUT).await
    });

    assert!(connect(&addr, "/12312345678").await.is_err());
    assert!(matches!(
        server.await.unwrap(),
        Err(TransportError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_upgrade_times_out_on_silent_peer() {
    let (transport, addr) = bind().await;

    let server = tokio::spawn(async move {
        let pending = transport.accept().await.expect("should accept");
        pending.upgrade(8, Duration::from_millis(50)).await
    });

    // Open a TCP connection but never send an HTTP request.
    let _silent = tokio::net::TcpStream::connect(&addr).await.unwrap();

    assert!(matches!(
        server.await.unwrap(),
        Err(TransportError::HandshakeTimeout(_))
    ));
}

#[tokio::test]
async fn test_recv_reports_graceful_close_code() {
    let (transport, addr) = bind().await;

    let server = tokio::spawn(async move {
        let pending = transport.accept().await.expect("should accept");
        pending.upgrade(8, HANDSHAKE_TIMEOUT).await
    });

    let mut client = connect(&addr, "/abcdefgh").await.unwrap();
    let (_, conn) = server.await.unwrap().unwrap();
    let (_writer, mut reader) = conn.into_split();

    client
        .send(Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "".into(),
        })))
        .await
        .unwrap();

    let err = reader.recv().await.expect_err("close should surface as error");
    assert!(matches!(err, TransportError::Closed { code: close::GOING_AWAY }));
    assert!(err.is_graceful_close());
}

#[tokio::test]
async fn test_dropped_peer_is_not_graceful() {
    let (transport, addr) = bind().await;

    let server = tokio::spawn(async move {
        let pending = transport.accept().await.expect("should accept");
        pending.upgrade(8, HANDSHAKE_TIMEOUT).await
    });

    let client = connect(&addr, "/abcdefgh").await.unwrap();
    let (_, conn) = server.await.unwrap().unwrap();
    let (_writer, mut reader) = conn.into_split();

    // Drop the TCP stream without a close handshake.
    drop(client);

    let err = reader.recv().await.expect_err("drop should surface as error");
    assert!(!err.is_graceful_close(), "abrupt drop is abnormal: {err:?}");
}

#[tokio::test]
async fn test_close_sends_normal_close_frame() {
    let (transport, addr) = bind().await;

    let server = tokio::spawn(async move {
        let pending = transport.accept().await.expect("should accept");
        pending.upgrade(8, HANDSHAKE_TIMEOUT).await
    });

    let mut client = connect(&addr, "/abcdefgh").await.unwrap();
    let (_, conn) = server.await.unwrap().unwrap();
    let (mut writer, _reader) = conn.into_split();

    writer.close(close::NORMAL).await.expect("close should succeed");

    match client.next().await {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(frame.code, CloseCode::Normal);
        }
        other => panic!("expected close frame, got {other:?}"),
    }
}
