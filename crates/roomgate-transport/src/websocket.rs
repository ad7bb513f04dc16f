//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use roomgate_protocol::{close, ProtocolError, RoomId};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::TransportError;

type BoxedSink = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;
type BoxedStream =
    Pin<Box<dyn Stream<Item = Result<Message, tungstenite::Error>> + Send>>;

/// A WebSocket listener that accepts raw TCP connections.
///
/// The upgrade is deliberately *not* performed here: it happens in
/// [`PendingConnection::upgrade`], on the connection's own task, so a slow
/// handshake never holds up the accept loop.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for and accepts the next incoming TCP connection.
    pub async fn accept(&self) -> Result<PendingConnection, TransportError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::debug!(%peer, "accepted TCP connection");
        Ok(PendingConnection { stream, peer })
    }
}

/// An accepted TCP connection that has not been upgraded yet.
pub struct PendingConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl PendingConnection {
    /// The remote address of the connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Performs the WebSocket handshake and extracts the room id.
    ///
    /// The room id is the trailing segment of the request path. When its
    /// length differs from `room_id_len` the request is answered with
    /// `400 Bad Request` and no upgrade takes place; the caller receives
    /// [`TransportError::Rejected`].
    pub async fn upgrade(
        self,
        room_id_len: usize,
        timeout: Duration,
    ) -> Result<(RoomId, WebSocketConnection), TransportError> {
        let peer = self.peer;
        let mut routed: Result<RoomId, ProtocolError> =
            Err(ProtocolError::MissingRoomId);

        let callback = |req: &Request, response: Response| {
            routed = RoomId::from_request_path(req.uri().path(), room_id_len);
            match &routed {
                Ok(_) => Ok(response),
                Err(reason) => Err(bad_request(reason)),
            }
        };

        let handshake = tokio_tungstenite::accept_hdr_async(self.stream, callback);
        let outcome = match tokio::time::timeout(timeout, handshake).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(TransportError::HandshakeTimeout(timeout)),
        };

        let ws = match outcome {
            Ok(ws) => ws,
            Err(e) => {
                return Err(match routed {
                    Err(reason @ ProtocolError::InvalidRoomId { .. }) => {
                        tracing::debug!(%peer, %reason, "rejected upgrade");
                        TransportError::Rejected(reason)
                    }
                    _ => TransportError::HandshakeFailed(e),
                });
            }
        };
        let room_id = routed?;

        tracing::debug!(%peer, %room_id, "upgraded WebSocket connection");
        Ok((room_id, WebSocketConnection::from_stream(ws)))
    }
}

fn bad_request(reason: &ProtocolError) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

/// An upgraded WebSocket connection.
///
/// Reading and writing go through separate halves. The write half is
/// shared by every task that may send to the client, the read half is
/// owned by the client's read pump.
pub struct WebSocketConnection {
    writer: FrameWriter,
    reader: FrameReader,
}

impl WebSocketConnection {
    /// Wraps an already-upgraded stream.
    ///
    /// Works over any byte stream, which lets tests run real WebSocket
    /// framing over `tokio::io::duplex`.
    pub fn from_stream<S>(ws: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        Self {
            writer: FrameWriter { sink: Box::pin(sink) },
            reader: FrameReader {
                stream: Box::pin(stream),
            },
        }
    }

    /// Splits the connection into its write and read halves.
    pub fn into_split(self) -> (FrameWriter, FrameReader) {
        (self.writer, self.reader)
    }
}

/// The write half of a [`WebSocketConnection`].
pub struct FrameWriter {
    sink: BoxedSink,
}

impl FrameWriter {
    /// Sends `data` as a single binary frame.
    pub async fn send_binary(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.sink
            .send(Message::Binary(data.to_vec().into()))
            .await
            .map_err(TransportError::SendFailed)
    }

    /// Sends a close frame with `code`, then flushes and closes the sink.
    ///
    /// The sink is closed even when the close frame could not be written;
    /// the first error is returned.
    pub async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        let sent = self.sink.send(Message::Close(Some(frame))).await;
        let closed = self.sink.close().await;
        sent.and(closed).map_err(TransportError::SendFailed)
    }
}

/// The read half of a [`WebSocketConnection`].
pub struct FrameReader {
    stream: BoxedStream,
}

impl FrameReader {
    /// Receives the next data payload.
    ///
    /// Binary and text frames are both returned as bytes; ping/pong frames
    /// are skipped (tungstenite answers pings itself). A close frame or the
    /// end of the stream surfaces as [`TransportError::Closed`].
    ///
    /// Cancel-safe: dropping the future between frames loses nothing.
    pub async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(data.into()),
                Some(Ok(Message::Text(text))) => {
                    return Ok(text.as_bytes().to_vec());
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map_or(close::NO_STATUS, |f| u16::from(f.code));
                    return Err(TransportError::Closed { code });
                }
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(tungstenite::Error::ConnectionClosed)) => {
                    return Err(TransportError::Closed { code: close::NORMAL });
                }
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e)),
                None => return Err(TransportError::Closed { code: close::ABNORMAL }),
            }
        }
    }
}
