//! Room configuration and state machine.

use roomgate_tick::TickConfig;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration applied to every room the gate creates.
///
/// Individual rooms can still override the tick rate through
/// [`RoomController::set_tick_rate`](crate::RoomController::set_tick_rate)
/// (typically from the room-creation hook) before they start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Tick rate in Hz. 0 disables the update loop.
    pub tick_rate_hz: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: TickConfig::DEFAULT_TICK_RATE_HZ,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The lifecycle state of a room controller.
///
/// Transitions are strictly ordered, no skipping and no going back:
///
/// ```text
/// Created → Running → Stopped
/// ```
///
/// - **Created**: Controller exists and owns its logic, but the tick loop
///   has not been spawned yet.
/// - **Running**: Tick loop is active; clients join, send and leave.
/// - **Stopped**: Terminal. Logic destroyed, remaining clients force-
///   disconnected, client map empty. Joins are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Created,
    Running,
    Stopped,
}

impl RoomState {
    /// Returns `true` once the room has shut down.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Returns the state that follows this one, or `None` for `Stopped`.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Created => Some(Self::Running),
            Self::Running => Some(Self::Stopped),
            Self::Stopped => None,
        }
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_state_next_follows_strict_order() {
        assert_eq!(RoomState::Created.next(), Some(RoomState::Running));
        assert_eq!(RoomState::Running.next(), Some(RoomState::Stopped));
        assert_eq!(RoomState::Stopped.next(), None);
    }

    #[test]
    fn test_room_state_can_transition_to() {
        assert!(RoomState::Created.can_transition_to(RoomState::Running));
        assert!(!RoomState::Created.can_transition_to(RoomState::Stopped));
        assert!(!RoomState::Stopped.can_transition_to(RoomState::Running));
    }

    #[test]
    fn test_room_state_display() {
        assert_eq!(RoomState::Created.to_string(), "Created");
        assert_eq!(RoomState::Stopped.to_string(), "Stopped");
    }

    #[test]
    fn test_room_config_default_ticks_at_30hz() {
        assert_eq!(RoomConfig::default().tick_rate_hz, 30);
    }

    #[test]
    fn test_room_config_missing_fields_use_defaults() {
        let config: RoomConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RoomConfig::default());

        let config: RoomConfig = serde_json::from_str(r#"{"tick_rate_hz": 60}"#).unwrap();
        assert_eq!(config.tick_rate_hz, 60);
    }
}
