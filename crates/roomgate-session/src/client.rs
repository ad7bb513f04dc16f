//! The connection wrapper: one [`Client`] per upgraded WebSocket.
//!
//! A `Client` is shared (`Arc<Client>`) between three parties:
//!
//! - the connection's **read pump**, the only caller of [`Client::read_next`]
//! - the **room** it belongs to, which sends to it from tick and event callbacks
//! - the **client registry**, which proves the client exists
//!
//! Because sends can come from the read pump's room callback *and* from the
//! room's tick at the same time, every write goes through one async lock.
//!
//! ## Connected vs. closed
//!
//! ```text
//!   Client::new ──→ [connected] ──(disconnect)──→ [closed]
//!                        │                           ▲
//!                        └──(peer closes, read ends)─┘ (after disconnect)
//! ```
//!
//! The write half is held as `Option<FrameWriter>`. `Some` means connected,
//! `None` means closed. Once `None`, every `send` and `disconnect` fails
//! with [`ClientError::NotConnected`] without touching the socket.

use std::sync::{Mutex, PoisonError};

use roomgate_protocol::{close, ClientId, RoomId};
use roomgate_transport::{FrameReader, FrameWriter, WebSocketConnection};
use tokio_util::sync::CancellationToken;

use crate::ClientError;

/// One connected party.
pub struct Client {
    id: ClientId,

    /// The write half. `None` once the client has been disconnected.
    ///
    /// A `tokio::sync::Mutex` because the guard is held across the
    /// `.await` of the frame write.
    writer: tokio::sync::Mutex<Option<FrameWriter>>,

    /// The read half. Only the read pump locks it, so it never contends;
    /// the lock just lets `read_next` take `&self`.
    reader: tokio::sync::Mutex<FrameReader>,

    /// The room this client is currently in, by id.
    ///
    /// An id rather than a handle: if the room is torn down, this is at
    /// worst a stale name, never a dangling reference. Guarded by a std
    /// mutex because it is never held across an await.
    room: Mutex<Option<RoomId>>,

    /// Cancelled on disconnect. Wakes a read pump parked in `read_next`.
    closed: CancellationToken,
}

impl Client {
    /// Wraps an upgraded connection and assigns it a fresh [`ClientId`].
    pub fn new(conn: WebSocketConnection) -> Self {
        let (writer, reader) = conn.into_split();
        Self {
            id: ClientId::generate(),
            writer: tokio::sync::Mutex::new(Some(writer)),
            reader: tokio::sync::Mutex::new(reader),
            room: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    /// The client's unique id.
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Whether the connection is still open from our side.
    pub fn is_connected(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// The room this client is in, if any.
    pub fn room(&self) -> Option<RoomId> {
        self.room
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records which room this client belongs to.
    ///
    /// Called by the room controller on join (with `Some`) and on leave or
    /// teardown (with `None`). A client is in at most one room at a time,
    /// so a new value simply replaces the old.
    pub fn set_room(&self, room: Option<RoomId>) {
        *self.room.lock().unwrap_or_else(PoisonError::into_inner) = room;
    }

    /// Sends `data` as one binary frame.
    ///
    /// Waits for the write lock, so concurrent senders are serialized and
    /// frames are never interleaved.
    ///
    /// # Errors
    /// - [`ClientError::NotConnected`] if the client was disconnected. No
    ///   write is attempted.
    /// - [`ClientError::Transport`] with the write failure, unchanged.
    pub async fn send(&self, data: &[u8]) -> Result<(), ClientError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(ClientError::NotConnected)?;
        writer.send_binary(data).await?;
        Ok(())
    }

    /// Sends a normal-closure frame and closes the connection.
    ///
    /// The write half is dropped whether or not the close frame made it
    /// out, so after this returns the client is closed either way. Any
    /// read pump blocked in [`read_next`](Self::read_next) wakes up with
    /// [`ClientError::NotConnected`].
    ///
    /// # Errors
    /// - [`ClientError::NotConnected`] if already closed. Calling twice is
    ///   harmless: the second call fails and changes nothing.
    /// - [`ClientError::Transport`] if the close frame could not be sent.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let mut slot = self.writer.lock().await;
        let mut writer = slot.take().ok_or(ClientError::NotConnected)?;
        self.closed.cancel();
        drop(slot);

        tracing::debug!(client_id = %self.id, "disconnecting client");
        writer.close(close::NORMAL).await?;
        Ok(())
    }

    /// Waits for the next payload from the peer.
    ///
    /// Text and binary frames both come back as bytes. A close from the
    /// peer is an error too; use [`ClientError::is_graceful_close`] to tell
    /// a normal goodbye from a broken connection.
    ///
    /// # Errors
    /// - [`ClientError::NotConnected`] if the client is (or becomes)
    ///   disconnected from our side.
    /// - [`ClientError::Transport`] for peer closes and read failures.
    pub async fn read_next(&self) -> Result<Vec<u8>, ClientError> {
        if self.closed.is_cancelled() {
            return Err(ClientError::NotConnected);
        }
        let mut reader = self.reader.lock().await;
        tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(ClientError::NotConnected),
            payload = reader.recv() => Ok(payload?),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("room", &self.room())
            .field("connected", &self.is_connected())
            .finish()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Runs real WebSocket framing over an in-memory duplex pipe: the
    //! server half is wrapped in a `Client`, the other half plays the peer.

    use std::sync::Arc;

    use futures_util::{SinkExt, StreamExt};
    use tokio::io::DuplexStream;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};

    use super::*;

    // -- Helpers ----------------------------------------------------------

    async fn pair() -> (Client, WebSocketStream<DuplexStream>) {
        let (server, peer) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
        let peer = WebSocketStream::from_raw_socket(peer, Role::Client, None).await;
        (Client::new(WebSocketConnection::from_stream(server)), peer)
    }

    fn room(id: &str) -> RoomId {
        RoomId::parse(id, id.chars().count()).unwrap()
    }

    // =====================================================================
    // send()
    // =====================================================================

    #[tokio::test]
    async fn test_send_delivers_binary_frame() {
        let (client, mut peer) = pair().await;

        client.send(b"state").await.expect("send should succeed");

        let msg = peer.next().await.unwrap().unwrap();
        assert_eq!(msg, Message::Binary(b"state".to_vec().into()));
    }

    #[tokio::test]
    async fn test_send_after_disconnect_is_not_connected() {
        let (client, mut peer) = pair().await;
        client.disconnect().await.unwrap();

        let err = client.send(b"late").await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));

        // Drain everything the peer saw: the close frame and nothing else.
        drop(client);
        let mut seen = Vec::new();
        while let Some(Ok(msg)) = peer.next().await {
            seen.push(msg);
        }
        assert!(matches!(seen.as_slice(), [Message::Close(_)]), "{seen:?}");
    }

    #[tokio::test]
    async fn test_concurrent_sends_are_not_interleaved() {
        let (client, mut peer) = pair().await;
        let client = Arc::new(client);

        let mut tasks = Vec::new();
        for i in 0..10u8 {
            let client = Arc::clone(&client);
            tasks.push(tokio::spawn(async move {
                client.send(&[i; 512]).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for _ in 0..10 {
            let data = peer.next().await.unwrap().unwrap().into_data();
            assert_eq!(data.len(), 512);
            assert!(data.iter().all(|b| *b == data[0]), "frame was interleaved");
        }
    }

    // =====================================================================
    // disconnect()
    // =====================================================================

    #[tokio::test]
    async fn test_disconnect_sends_normal_closure() {
        let (client, mut peer) = pair().await;

        client.disconnect().await.expect("first disconnect should succeed");
        assert!(!client.is_connected());

        match peer.next().await {
            Some(Ok(Message::Close(Some(frame)))) => assert_eq!(frame.code, CloseCode::Normal),
            other => panic!("expected normal close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_disconnect_fails_without_side_effects() {
        let (client, _peer) = pair().await;

        client.disconnect().await.unwrap();
        let err = client.disconnect().await.unwrap_err();

        assert!(matches!(err, ClientError::NotConnected));
        assert!(!client.is_connected());
    }

    // =====================================================================
    // read_next()
    // =====================================================================

    #[tokio::test]
    async fn test_read_next_returns_payloads_in_order() {
        let (client, mut peer) = pair().await;

        peer.send(Message::Binary(b"one".to_vec().into())).await.unwrap();
        peer.send(Message::Binary(b"two".to_vec().into())).await.unwrap();

        assert_eq!(client.read_next().await.unwrap(), b"one");
        assert_eq!(client.read_next().await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_read_next_peer_close_is_graceful() {
        let (client, mut peer) = pair().await;

        peer.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        })))
        .await
        .unwrap();

        let err = client.read_next().await.unwrap_err();
        assert!(err.is_graceful_close(), "{err:?}");
    }

    #[tokio::test]
    async fn test_read_next_peer_error_code_is_not_graceful() {
        let (client, mut peer) = pair().await;

        peer.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Protocol,
            reason: "".into(),
        })))
        .await
        .unwrap();

        let err = client.read_next().await.unwrap_err();
        assert!(!err.is_graceful_close(), "{err:?}");
    }

    #[tokio::test]
    async fn test_disconnect_wakes_blocked_reader() {
        let (client, _peer) = pair().await;
        let client = Arc::new(client);

        let reader = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.read_next().await })
        };
        tokio::task::yield_now().await;

        client.disconnect().await.unwrap();

        let result = reader.await.unwrap();
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    // =====================================================================
    // room back-reference
    // =====================================================================

    #[tokio::test]
    async fn test_room_back_reference() {
        let (client, _peer) = pair().await;
        assert_eq!(client.room(), None);

        client.set_room(Some(room("12345678")));
        assert_eq!(client.room(), Some(room("12345678")));

        client.set_room(None);
        assert_eq!(client.room(), None);
    }

    #[tokio::test]
    async fn test_each_client_gets_unique_id() {
        let (a, _pa) = pair().await;
        let (b, _pb) = pair().await;
        assert_ne!(a.id(), b.id());
    }
}
