//! Room registry: at most one live controller per room id.
//!
//! The registry decides, under one lock, whether a joining client reuses a
//! room or creates it, and keeps a member count per room. A room is
//! evicted only when that count drops to zero, so a client admitted while
//! the last member is leaving either keeps the room alive or lands on a
//! brand-new controller. It can never join a room that is being torn down.
//!
//! ## Ownership transfer
//!
//! ```text
//! admit() ──→ Existing(controller) ─────────────────────┐
//!    │                                                  ▼
//!    └──────→ Created(pending) ──→ launch() ──→ controller ──→ release()
//!              (room lock held:                (member)       (last one out
//!               hook + init run                                stops the room)
//!               before anyone
//!               else can enter)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use roomgate_protocol::RoomId;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;

use crate::controller::RoomInner;
use crate::{RoomConfig, RoomController, RoomError, RoomLogic};

struct RoomEntry<L: RoomLogic> {
    controller: Arc<RoomController<L>>,
    members: usize,
}

struct RegistryState<L: RoomLogic> {
    rooms: HashMap<RoomId, RoomEntry<L>>,
    closed: bool,
}

/// The outcome of [`RoomRegistry::admit`].
pub enum Admission<L: RoomLogic> {
    /// The room already existed.
    Existing(Arc<RoomController<L>>),
    /// The room was just created and must be launched by the caller.
    Created(PendingRoom<L>),
}

/// A freshly created room that has not run `init` yet.
///
/// Holds the room lock, so every other client admitted to the same room
/// blocks in `client_join` until [`launch`](Self::launch) returns.
pub struct PendingRoom<L: RoomLogic> {
    controller: Arc<RoomController<L>>,
    guard: OwnedMutexGuard<RoomInner<L>>,
    tracker: TaskTracker,
    _token: TaskTrackerToken,
}

impl<L: RoomLogic> PendingRoom<L> {
    /// The new controller, for wiring it up before launch.
    ///
    /// Do not call `client_join` (or anything else that takes the room
    /// lock) on it before launching: the lock is held here.
    pub fn controller(&self) -> &Arc<RoomController<L>> {
        &self.controller
    }

    /// Runs the logic's `init`, starts the tick loop and releases the room.
    pub async fn launch(self) -> Arc<RoomController<L>> {
        let Self {
            controller,
            mut guard,
            tracker,
            _token,
        } = self;

        guard.logic.init().await;
        tracing::debug!(room_id = %controller.id(), "room initialized");
        controller.start(&tracker);
        drop(guard);
        controller
    }
}

/// All live rooms, keyed by id.
pub struct RoomRegistry<L: RoomLogic> {
    state: Mutex<RegistryState<L>>,
    /// Tracks every tick loop, so shutdown can wait for teardown.
    tracker: TaskTracker,
}

impl<L: RoomLogic> RoomRegistry<L> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                rooms: HashMap::new(),
                closed: false,
            }),
            tracker: TaskTracker::new(),
        }
    }

    /// Admits one client to `room_id`, creating the room if needed.
    ///
    /// `make_logic` is only called when the room is created. Every
    /// successful admission must be paired with one [`release`](Self::release).
    ///
    /// # Errors
    /// [`RoomError::ShuttingDown`] once [`shutdown`](Self::shutdown) has begun.
    pub async fn admit(
        &self,
        room_id: &RoomId,
        config: &RoomConfig,
        make_logic: impl FnOnce() -> L,
    ) -> Result<Admission<L>, RoomError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(RoomError::ShuttingDown);
        }

        if let Some(entry) = state.rooms.get_mut(room_id) {
            entry.members += 1;
            return Ok(Admission::Existing(Arc::clone(&entry.controller)));
        }

        let controller = Arc::new(RoomController::new(room_id.clone(), config, make_logic()));
        // Uncontended: nobody else can see this controller yet.
        let guard = Arc::clone(&controller.inner).lock_owned().await;
        state.rooms.insert(
            room_id.clone(),
            RoomEntry {
                controller: Arc::clone(&controller),
                members: 1,
            },
        );
        tracing::info!(%room_id, rooms = state.rooms.len(), "room created");

        Ok(Admission::Created(PendingRoom {
            controller,
            guard,
            tracker: self.tracker.clone(),
            _token: self.tracker.token(),
        }))
    }

    /// Gives back one admission to `controller`'s room.
    ///
    /// When the last member is released the room is removed from the
    /// registry and told to stop. Returns `true` in that case. Releasing a
    /// controller that is no longer registered (already drained by
    /// shutdown) does nothing.
    pub async fn release(&self, controller: &Arc<RoomController<L>>) -> bool {
        let mut state = self.state.lock().await;
        let Some(entry) = state.rooms.get_mut(controller.id()) else {
            return false;
        };
        if !Arc::ptr_eq(&entry.controller, controller) {
            return false;
        }

        entry.members = entry.members.saturating_sub(1);
        if entry.members > 0 {
            return false;
        }

        state.rooms.remove(controller.id());
        controller.stop();
        tracing::info!(room_id = %controller.id(), rooms = state.rooms.len(), "room emptied");
        true
    }

    /// Looks up a live room.
    pub async fn get(&self, room_id: &RoomId) -> Option<Arc<RoomController<L>>> {
        self.state
            .lock()
            .await
            .rooms
            .get(room_id)
            .map(|entry| Arc::clone(&entry.controller))
    }

    pub async fn contains(&self, room_id: &RoomId) -> bool {
        self.state.lock().await.rooms.contains_key(room_id)
    }

    /// Returns the number of live rooms.
    pub async fn len(&self) -> usize {
        self.state.lock().await.rooms.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.rooms.is_empty()
    }

    /// Lists all live room ids.
    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.state.lock().await.rooms.keys().cloned().collect()
    }

    /// Stops every room and waits for all of them to finish tearing down.
    ///
    /// New admissions are refused from here on. Rooms that are still being
    /// launched are waited for as well.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<RoomController<L>>> = {
            let mut state = self.state.lock().await;
            state.closed = true;
            state.rooms.drain().map(|(_, entry)| entry.controller).collect()
        };

        tracing::info!(rooms = drained.len(), "stopping all rooms");
        for controller in &drained {
            controller.stop();
        }

        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("all rooms stopped");
    }
}

impl<L: RoomLogic> Default for RoomRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}
