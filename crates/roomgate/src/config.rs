//! Gate configuration.

use std::time::Duration;

use roomgate_protocol::DEFAULT_ROOM_ID_LEN;
use roomgate_room::RoomConfig;
use serde::{Deserialize, Serialize};

use crate::GateError;

/// Everything needed to run a gate.
///
/// Every field has a default, so a JSON config only has to name what it
/// changes:
///
/// ```json
/// { "bind_addr": "0.0.0.0:9000", "room": { "tick_rate_hz": 60 } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Address the listener binds to.
    pub bind_addr: String,
    /// Exact number of characters a room id must have.
    pub room_id_len: usize,
    /// How long a peer may take to finish the WebSocket upgrade.
    pub handshake_timeout_ms: u64,
    /// Settings applied to every room.
    pub room: RoomConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            room_id_len: DEFAULT_ROOM_ID_LEN,
            handshake_timeout_ms: 5_000,
            room: RoomConfig::default(),
        }
    }
}

impl GateConfig {
    /// Parses a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, GateError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
