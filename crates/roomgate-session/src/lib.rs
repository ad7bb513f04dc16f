//! Client connections and client tracking for Roomgate.
//!
//! This crate owns everything about a single connected party:
//!
//! 1. **The connection wrapper** ([`Client`]): serialized writes, an
//!    explicit disconnect, and a blocking read for the read pump.
//! 2. **Existence tracking** ([`ClientRegistry`]): the server-wide set of
//!    clients, independent of which room each one is in.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← keeps its own membership map of Arc<Client>
//!     ↕
//! Session Layer (this crate)  ← wraps connections, tracks who exists
//!     ↕
//! Transport Layer (below)  ← provides FrameWriter / FrameReader halves
//! ```

mod client;
mod error;
mod registry;

pub use client::Client;
pub use error::ClientError;
pub use registry::ClientRegistry;
