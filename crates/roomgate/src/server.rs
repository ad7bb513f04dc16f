//! `Gate` builder and accept loop.
//!
//! This is the entry point for running a Roomgate server. It ties the
//! layers together: transport → session (clients) → room (controllers).

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use roomgate_protocol::RoomId;
use roomgate_room::{RoomController, RoomLogic, RoomRegistry};
use roomgate_session::ClientRegistry;
use roomgate_transport::{PendingConnection, TransportError, WebSocketTransport};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::handler::handle_connection;
use crate::{GateConfig, GateError};

/// Builds a fresh logic instance for a newly created room.
pub(crate) type RoomFactory<L> = Box<dyn Fn(&RoomId) -> L + Send + Sync>;

/// Called once for every newly created room, before its `init`.
pub(crate) type RoomHook<L> = Box<dyn Fn(&Arc<RoomController<L>>) + Send + Sync>;

/// Shared gate state passed to each connection task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Both
/// registries lock internally.
pub(crate) struct GateState<L: RoomLogic> {
    pub(crate) config: GateConfig,
    pub(crate) rooms: RoomRegistry<L>,
    pub(crate) clients: ClientRegistry,
    pub(crate) factory: RoomFactory<L>,
    pub(crate) on_room_created: Option<RoomHook<L>>,
    pub(crate) shutdown: CancellationToken,
    /// Every connection task, so shutdown can wait for read pumps to end.
    pub(crate) connections: TaskTracker,
}

/// Builder for configuring and starting a gate.
///
/// # Example
///
/// ```rust,ignore
/// use roomgate::prelude::*;
///
/// let gate = Gate::builder()
///     .bind("0.0.0.0:8080")
///     .tick_rate(60)
///     .on_room_created(|room| tracing::info!(room_id = %room.id(), "new room"))
///     .build(|_room_id| MyRoom::default())
///     .await?;
/// gate.run().await
/// ```
pub struct GateBuilder<L: RoomLogic> {
    config: GateConfig,
    on_room_created: Option<RoomHook<L>>,
}

impl<L: RoomLogic> GateBuilder<L> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: GateConfig::default(),
            on_room_created: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: GateConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the gate to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the exact room id length accepted in the request path.
    pub fn room_id_len(mut self, len: usize) -> Self {
        self.config.room_id_len = len;
        self
    }

    /// Sets the default tick rate for new rooms. 0 disables ticking.
    pub fn tick_rate(mut self, hz: u32) -> Self {
        self.config.room.tick_rate_hz = hz;
        self
    }

    /// Sets how long a peer may take to complete the upgrade. Saturates at
    /// `u64::MAX` milliseconds.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Registers a hook that runs once per newly created room.
    ///
    /// The hook runs before the room's `init` and before any client has
    /// joined, while the room lock is held. It may read the controller or
    /// call [`RoomController::set_tick_rate`], but must not call methods
    /// that take the room lock (`client_join` and friends).
    pub fn on_room_created<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<RoomController<L>>) + Send + Sync + 'static,
    {
        self.on_room_created = Some(Box::new(hook));
        self
    }

    /// Binds the listener and returns a gate ready to [`run`](Gate::run).
    ///
    /// `factory` is called once per newly created room to build its logic.
    pub async fn build<F>(self, factory: F) -> Result<Gate<L>, GateError>
    where
        F: Fn(&RoomId) -> L + Send + Sync + 'static,
    {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let state = Arc::new(GateState {
            config: self.config,
            rooms: RoomRegistry::new(),
            clients: ClientRegistry::new(),
            factory: Box::new(factory),
            on_room_created: self.on_room_created,
            shutdown: CancellationToken::new(),
            connections: TaskTracker::new(),
        });

        Ok(Gate { transport, state })
    }
}

impl<L: RoomLogic> Default for GateBuilder<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Roomgate server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct Gate<L: RoomLogic> {
    transport: WebSocketTransport,
    state: Arc<GateState<L>>,
}

impl<L: RoomLogic> Gate<L> {
    /// Creates a new builder.
    pub fn builder() -> GateBuilder<L> {
        GateBuilder::new()
    }

    /// Returns the local address the gate is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns a handle for observing the gate and shutting it down.
    pub fn handle(&self) -> GateHandle<L> {
        GateHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Runs the accept loop until shutdown.
    ///
    /// Each accepted connection gets its own task for the upgrade and the
    /// read pump. The loop ends when [`GateHandle::shutdown`] is called or
    /// the listener fails. Either way the gate then stops accepting, stops
    /// every room, and waits until every room and connection task is done.
    ///
    /// # Errors
    /// Returns the listener error if accepting failed.
    pub async fn run(self) -> Result<(), GateError> {
        let Self { transport, state } = self;
        tracing::info!(
            addr = ?transport.local_addr().ok(),
            room_id_len = state.config.room_id_len,
            tick_rate_hz = state.config.room.tick_rate_hz,
            "roomgate running"
        );

        let result = {
            let transport = &transport;
            accept_loop(&state, move || transport.accept()).await
        };

        drop(transport);
        shut_down(&state).await;
        result
    }
}

/// Accepts connections until shutdown is requested or `accept` fails,
/// spawning one handler task per connection.
async fn accept_loop<L, A, F>(state: &Arc<GateState<L>>, mut accept: A) -> Result<(), GateError>
where
    L: RoomLogic,
    A: FnMut() -> F,
    F: Future<Output = Result<PendingConnection, TransportError>>,
{
    loop {
        tokio::select! {
            biased;
            () = state.shutdown.cancelled() => return Ok(()),
            accepted = accept() => match accepted {
                Ok(pending) => {
                    let conn_state = Arc::clone(state);
                    state.connections.spawn(async move {
                        if let Err(e) = handle_connection(pending, conn_state).await {
                            log_connection_error(&e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "listener failed, shutting down");
                    return Err(GateError::from(e));
                }
            },
        }
    }
}

/// Stops every room and waits for all room and connection tasks.
async fn shut_down<L: RoomLogic>(state: &GateState<L>) {
    state.shutdown.cancel();
    state.rooms.shutdown().await;
    state.connections.close();
    state.connections.wait().await;
    tracing::info!("roomgate stopped");
}

fn log_connection_error(e: &GateError) {
    match e {
        GateError::Transport(TransportError::Rejected(reason)) => {
            tracing::debug!(%reason, "connection rejected");
        }
        GateError::Room(e) => {
            tracing::debug!(error = %e, "client could not be placed in a room");
        }
        e => tracing::warn!(error = %e, "connection ended with error"),
    }
}

/// A cheap, cloneable handle to a running gate.
pub struct GateHandle<L: RoomLogic> {
    state: Arc<GateState<L>>,
}

impl<L: RoomLogic> Clone for GateHandle<L> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<L: RoomLogic> GateHandle<L> {
    /// Asks the gate to shut down. Returns immediately; the
    /// [`Gate::run`] future completes once teardown is finished.
    pub fn shutdown(&self) {
        self.state.shutdown.cancel();
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.state.shutdown.is_cancelled()
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.state.rooms.len().await
    }

    /// Number of connected clients.
    pub async fn client_count(&self) -> usize {
        self.state.clients.len().await
    }

    /// Looks up a live room.
    pub async fn room(&self, room_id: &RoomId) -> Option<Arc<RoomController<L>>> {
        self.state.rooms.get(room_id).await
    }

    /// The configuration the gate runs with.
    pub fn config(&self) -> &GateConfig {
        &self.state.config
    }
}
