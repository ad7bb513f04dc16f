//! Unified error type for the Roomgate framework.

use roomgate_protocol::ProtocolError;
use roomgate_room::RoomError;
use roomgate_session::ClientError;
use roomgate_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `roomgate` crate you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// conversions let `?` lift sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Listener, handshake, or frame I/O failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Invalid routing information.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A client operation failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A room refused the operation (stopped, shutting down).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}
