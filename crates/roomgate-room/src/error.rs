//! Error types for the room layer.

use roomgate_protocol::RoomId;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room has already stopped and no longer accepts clients.
    #[error("room {0} has stopped")]
    Stopped(RoomId),

    /// The registry is shutting down and refuses new admissions.
    #[error("room registry is shutting down")]
    ShuttingDown,
}
