//! Error types for the protocol layer.

/// Errors that can occur while interpreting routing information.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The room id taken from the request path has the wrong length.
    ///
    /// Lengths are counted in characters. The connection is refused
    /// before the WebSocket upgrade happens.
    #[error("room id is invalid: expected {expected} characters, got {actual}")]
    InvalidRoomId {
        /// Configured room id length.
        expected: usize,
        /// Length of the segment the client sent.
        actual: usize,
    },

    /// The handshake ended before a request path was seen.
    #[error("request carried no room id")]
    MissingRoomId,
}
