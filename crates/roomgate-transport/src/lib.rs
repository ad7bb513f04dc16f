//! Transport layer for Roomgate.
//!
//! Wraps `tokio-tungstenite` into the three pieces the dispatcher needs:
//!
//! - [`WebSocketTransport`]: a TCP listener handing out
//!   [`PendingConnection`]s.
//! - [`PendingConnection::upgrade`]: the WebSocket handshake, which reads
//!   the room id from the request path and answers `400 Bad Request`
//!   *before* upgrading when it has the wrong length.
//! - [`WebSocketConnection`]: an upgraded connection, split into an
//!   independent [`FrameWriter`] and [`FrameReader`] so a pending read
//!   never blocks a write.

mod error;
mod websocket;

pub use error::TransportError;
pub use websocket::{
    FrameReader, FrameWriter, PendingConnection, WebSocketConnection,
    WebSocketTransport,
};
