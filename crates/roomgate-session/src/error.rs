//! Error types for the session layer.

use roomgate_protocol::ClientId;
use roomgate_transport::TransportError;

/// Errors that can occur while talking to, or tracking, a client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The client was already disconnected from our side.
    ///
    /// Returned by `send`, `disconnect` and `read_next` once the write half
    /// is gone. Nothing was written to the socket.
    #[error("client is not connected")]
    NotConnected,

    /// The underlying WebSocket failed or the peer closed the connection.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A client with this id is already in the registry.
    /// Ids are random, so this points at a bug rather than bad luck.
    #[error("client {0} is already registered")]
    AlreadyRegistered(ClientId),
}

impl ClientError {
    /// Whether this error marks an expected end of the connection.
    ///
    /// True for our own disconnect and for a peer close with "normal
    /// closure" or "going away". Callers log everything else.
    pub fn is_graceful_close(&self) -> bool {
        match self {
            Self::NotConnected => true,
            Self::Transport(e) => e.is_graceful_close(),
            Self::AlreadyRegistered(_) => false,
        }
    }
}
