use std::time::Duration;

use roomgate_protocol::{close, ProtocolError};
use tokio_tungstenite::tungstenite;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer ended the connection. `code` is the WebSocket close code
    /// (1006 when the stream ended without a close frame).
    #[error("connection closed with code {code}")]
    Closed {
        /// The close code reported for the closure.
        code: u16,
    },

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] tungstenite::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] tungstenite::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The WebSocket upgrade failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(#[source] tungstenite::Error),

    /// The peer did not finish the upgrade in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The upgrade request was refused before upgrading.
    #[error("connection rejected: {0}")]
    Rejected(#[from] ProtocolError),
}

impl TransportError {
    /// Returns `true` for a normal or going-away closure by the peer.
    ///
    /// Callers use this to keep expected disconnects out of error logs.
    pub fn is_graceful_close(&self) -> bool {
        matches!(self, Self::Closed { code } if close::is_graceful(*code))
    }
}
