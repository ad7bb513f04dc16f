//! Room lifecycle management for Roomgate.
//!
//! Each room is a [`RoomController`] that owns one [`RoomLogic`] instance,
//! the set of clients currently in the room, and a fixed-rate tick loop
//! running as its own Tokio task. Every logic callback runs under the
//! room's lock.
//!
//! # Key types
//!
//! - [`RoomLogic`]: the trait room implementations provide
//! - [`RoomController`]: drives one room: join/leave/data, ticks, teardown
//! - [`RoomRegistry`]: one controller per room id, created on demand
//! - [`RoomState`]: lifecycle state machine
//! - [`RoomConfig`]: room settings (tick rate)

mod config;
mod controller;
mod error;
mod logic;
mod registry;

pub use config::{RoomConfig, RoomState};
pub use controller::RoomController;
pub use error::RoomError;
pub use logic::RoomLogic;
pub use registry::{Admission, PendingRoom, RoomRegistry};
