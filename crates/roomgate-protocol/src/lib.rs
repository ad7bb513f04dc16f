//! Routing vocabulary for Roomgate.
//!
//! This crate holds the small set of values every other layer agrees on:
//!
//! - **Identifiers** ([`ClientId`], [`RoomId`]): who is connected and
//!   which room they asked for.
//! - **Close codes** ([`close`]): which WebSocket closures are graceful.
//! - **Errors** ([`ProtocolError`]): what makes a room request invalid.
//!
//! Message *content* is opaque to Roomgate. Payloads are plain byte
//! vectors handed to the room logic untouched, so there is no codec here.

mod error;
mod types;

pub mod close;

pub use error::ProtocolError;
pub use types::{ClientId, RoomId, DEFAULT_ROOM_ID_LEN};
