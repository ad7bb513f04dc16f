//! # Roomgate
//!
//! Room-routed WebSocket server for real-time backends.
//!
//! Clients connect to `ws://host/<room-id>`. The gate validates the room
//! id during the handshake, creates the room on first use, and feeds every
//! payload to the room's [`RoomLogic`](prelude::RoomLogic). Each room runs
//! its own fixed-rate tick loop and is torn down when its last client
//! leaves.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use roomgate::prelude::*;
//!
//! struct Echo;
//!
//! impl RoomLogic for Echo {
//!     async fn client_data(&mut self, client: &Arc<Client>, payload: Vec<u8>) {
//!         let _ = client.send(&payload).await;
//!     }
//! }
//!
//! # async fn run() -> Result<(), GateError> {
//! let gate = Gate::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(|_room_id| Echo)
//!     .await?;
//! gate.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::GateConfig;
pub use error::GateError;
pub use server::{Gate, GateBuilder, GateHandle};

pub use roomgate_protocol as protocol;
pub use roomgate_room as room;
pub use roomgate_session as session;
pub use roomgate_tick as tick;
pub use roomgate_transport as transport;

/// Everything needed to write a room and run a gate.
pub mod prelude {
    pub use crate::{Gate, GateBuilder, GateConfig, GateError, GateHandle};
    pub use roomgate_protocol::{ClientId, RoomId};
    pub use roomgate_room::{RoomConfig, RoomController, RoomError, RoomLogic, RoomState};
    pub use roomgate_session::{Client, ClientError};
    pub use roomgate_tick::TickConfig;
}
