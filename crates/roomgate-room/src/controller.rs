//! Room controller: owns one logic instance, its members and its tick loop.
//!
//! All access to the logic goes through a single async mutex. Ticks, joins,
//! leaves and payloads from every member queue up on that lock, which is
//! what makes the logic single-threaded from its own point of view.
//!
//! There is no backpressure. A callback that awaits a send to a slow
//! client keeps the lock until the write completes, and every other event
//! for the room (including ticks) waits behind it. The tick scheduler
//! reports the resulting overruns.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use roomgate_protocol::{ClientId, RoomId};
use roomgate_session::Client;
use roomgate_tick::{TickConfig, TickScheduler};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::{RoomConfig, RoomError, RoomLogic, RoomState};

/// Everything the room lock protects.
pub(crate) struct RoomInner<L> {
    pub(crate) logic: L,
    clients: HashMap<ClientId, Arc<Client>>,
}

/// Drives one room. Shared as `Arc<RoomController<L>>`.
pub struct RoomController<L: RoomLogic> {
    id: RoomId,
    tick_rate_hz: AtomicU32,
    pub(crate) inner: Arc<Mutex<RoomInner<L>>>,
    /// Mirror of `inner.clients.len()`, readable without the room lock.
    client_count: AtomicUsize,
    state: watch::Sender<RoomState>,
    stop: CancellationToken,
}

impl<L: RoomLogic> RoomController<L> {
    /// Creates a controller in the `Created` state. Nothing runs yet.
    pub fn new(id: RoomId, config: &RoomConfig, logic: L) -> Self {
        Self {
            id,
            tick_rate_hz: AtomicU32::new(config.tick_rate_hz),
            inner: Arc::new(Mutex::new(RoomInner {
                logic,
                clients: HashMap::new(),
            })),
            client_count: AtomicUsize::new(0),
            state: watch::Sender::new(RoomState::Created),
            stop: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn state(&self) -> RoomState {
        *self.state.borrow()
    }

    /// Number of clients currently in the room.
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Acquire)
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.tick_rate_hz.load(Ordering::Relaxed)
    }

    /// Overrides the tick rate. Only takes effect if called before
    /// [`start`](Self::start).
    pub fn set_tick_rate(&self, hz: u32) {
        self.tick_rate_hz.store(hz, Ordering::Relaxed);
    }

    /// Moves to `Running` and spawns the tick loop on `tracker`.
    ///
    /// Starting twice is a no-op with a warning.
    pub fn start(self: &Arc<Self>, tracker: &TaskTracker) {
        let started = self.state.send_if_modified(|state| {
            if state.can_transition_to(RoomState::Running) {
                *state = RoomState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            tracing::warn!(room_id = %self.id, state = %self.state(), "room already started");
            return;
        }
        tracker.spawn(Arc::clone(self).run());
    }

    /// Signals the tick loop to stop. Idempotent and never blocks.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Waits until the room has fully stopped.
    pub async fn stopped(&self) {
        let mut state = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close first.
        let _ = state.wait_for(RoomState::is_stopped).await;
    }

    /// Adds `client` to the room and runs the logic's `client_join`.
    ///
    /// # Errors
    /// [`RoomError::Stopped`] if the room has already shut down.
    pub async fn client_join(&self, client: &Arc<Client>) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        if self.state().is_stopped() {
            return Err(RoomError::Stopped(self.id.clone()));
        }
        if inner.clients.contains_key(client.id()) {
            tracing::warn!(room_id = %self.id, client_id = %client.id(), "client already in room");
            return Ok(());
        }

        inner.clients.insert(client.id().clone(), Arc::clone(client));
        self.client_count.store(inner.clients.len(), Ordering::Release);
        client.set_room(Some(self.id.clone()));
        inner.logic.client_join(client).await;

        tracing::info!(
            room_id = %self.id,
            client_id = %client.id(),
            clients = inner.clients.len(),
            "client joined"
        );
        Ok(())
    }

    /// Removes `client` from the room, running the logic's `client_leave`.
    ///
    /// A client that is not a member (never joined, or already left when
    /// the room stopped) only has its room reference cleared, so the logic
    /// sees exactly one leave per joined client.
    pub async fn client_leave(&self, client: &Arc<Client>) {
        let mut inner = self.inner.lock().await;
        if client.room().as_ref() == Some(&self.id) {
            client.set_room(None);
        }
        if !inner.clients.contains_key(client.id()) {
            return;
        }

        inner.logic.client_leave(client).await;
        inner.clients.remove(client.id());
        self.client_count.store(inner.clients.len(), Ordering::Release);

        tracing::info!(
            room_id = %self.id,
            client_id = %client.id(),
            clients = inner.clients.len(),
            "client left"
        );
    }

    /// Hands a payload from `client` to the logic. Non-members are ignored.
    pub async fn client_data(&self, client: &Arc<Client>, payload: Vec<u8>) {
        let mut inner = self.inner.lock().await;
        if !inner.clients.contains_key(client.id()) {
            tracing::debug!(room_id = %self.id, client_id = %client.id(), "payload from non-member, ignoring");
            return;
        }
        inner.logic.client_data(client, payload).await;
    }

    /// The tick loop. Runs until the stop signal, then tears the room down.
    async fn run(self: Arc<Self>) {
        let mut scheduler = TickScheduler::new(TickConfig::with_rate(self.tick_rate_hz()));
        tracing::info!(room_id = %self.id, rate_hz = scheduler.tick_rate_hz(), "room started");

        loop {
            tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                tick = scheduler.wait_for_tick() => {
                    let mut inner = self.inner.lock().await;
                    inner.logic.update(tick.timestamp_nanos).await;
                    drop(inner);
                    scheduler.record_tick_end();
                }
            }
        }

        self.finish(&scheduler).await;
    }

    /// Destroys the logic, then force-disconnects every leftover client and
    /// runs its `client_leave`, and marks the room `Stopped`, all under the
    /// room lock.
    async fn finish(&self, scheduler: &TickScheduler) {
        let mut inner = self.inner.lock().await;
        inner.logic.destroy().await;

        let remaining: Vec<Arc<Client>> = inner.clients.drain().map(|(_, c)| c).collect();
        self.client_count.store(0, Ordering::Release);
        for client in &remaining {
            client.set_room(None);
            if let Err(e) = client.disconnect().await {
                if !e.is_graceful_close() {
                    tracing::debug!(room_id = %self.id, client_id = %client.id(), error = %e, "forced disconnect failed");
                }
            }
            // Already out of the map, so the read pump's own leave is a no-op.
            inner.logic.client_leave(client).await;
        }

        self.state.send_replace(RoomState::Stopped);
        drop(inner);

        let metrics = scheduler.metrics();
        tracing::info!(
            room_id = %self.id,
            disconnected = remaining.len(),
            ticks = metrics.total_ticks,
            overruns = metrics.total_overruns,
            max_tick_ms = metrics.max_tick_time.as_secs_f64() * 1000.0,
            "room stopped"
        );
    }
}
