//! Identity types shared by every Roomgate layer.
//!
//! Two identifiers travel through the system:
//!
//! - [`ClientId`]: minted by the server for every upgraded connection.
//! - [`RoomId`]: supplied by the client as the trailing segment of the
//!   upgrade request path (`ws://host/<room-id>`).

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Default number of characters a room identifier must have.
pub const DEFAULT_ROOM_ID_LEN: usize = 8;

// ---------------------------------------------------------------------------
// ClientId
// ---------------------------------------------------------------------------

/// A unique identifier for one connected client.
///
/// Generated from 128 random bits and rendered as 32 lowercase hex
/// characters. The odds of two live clients colliding are negligible, so
/// the id is usable as a map key without a central counter.
///
/// `#[serde(transparent)]` serializes this as the bare string rather than
/// `{ "0": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Generates a fresh random client id.
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomId
// ---------------------------------------------------------------------------

/// The identifier of a room, chosen by the connecting client.
///
/// A `RoomId` can only be built through [`RoomId::parse`] or
/// [`RoomId::from_request_path`], both of which enforce the configured
/// fixed length. Holding a `RoomId` therefore proves the value was valid
/// at the time it was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Validates `raw` against the required length (in characters).
    pub fn parse(raw: &str, expected_len: usize) -> Result<Self, ProtocolError> {
        let actual = raw.chars().count();
        if actual != expected_len {
            return Err(ProtocolError::InvalidRoomId {
                expected: expected_len,
                actual,
            });
        }
        Ok(Self(raw.to_owned()))
    }

    /// Extracts the room id from an upgrade request path.
    ///
    /// The room id is the trailing path segment: `/12345678` and
    /// `/rooms/12345678` both resolve to `12345678`. A trailing slash
    /// yields an empty segment, which never matches a non-zero length.
    pub fn from_request_path(
        path: &str,
        expected_len: usize,
    ) -> Result<Self, ProtocolError> {
        let segment = path.rsplit('/').next().unwrap_or_default();
        Self::parse(segment, expected_len)
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
