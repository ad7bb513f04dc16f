//! The `RoomLogic` trait: the extension point for application code.
//!
//! One logic instance lives inside each room. The controller calls these
//! methods at the right time, always while holding the room lock, so an
//! implementation never sees two of its own methods running at once and
//! can keep plain `&mut self` state.

use std::future::Future;
use std::sync::Arc;

use roomgate_session::Client;

/// The callbacks a room implementation provides.
///
/// Every method returns a `Send` future so rooms can run on the
/// multi-threaded runtime. Implementors may simply write `async fn`:
///
/// ```ignore
/// impl RoomLogic for Echo {
///     async fn client_data(&mut self, client: &Arc<Client>, payload: Vec<u8>) {
///         let _ = client.send(&payload).await;
///     }
/// }
/// ```
///
/// Sending to clients from inside a callback is fine and needs no extra
/// locking. A send that blocks on a slow peer blocks the whole room, ticks
/// included, until it completes.
pub trait RoomLogic: Send + 'static {
    /// Called once after the room is created, before its tick loop starts
    /// and before any client joins. Default: no-op.
    fn init(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called once when the room stops, after the tick loop has halted
    /// and before remaining clients are disconnected. Only their
    /// `client_leave` calls follow it. Default: no-op.
    fn destroy(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called once per tick with a strictly increasing timestamp in
    /// nanoseconds since the Unix epoch. Default: no-op.
    fn update(&mut self, _timestamp_nanos: u64) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called when `client` enters the room, before any of its data.
    /// Default: no-op.
    fn client_join(&mut self, _client: &Arc<Client>) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called exactly once for every client that joined, when it leaves.
    /// Default: no-op.
    ///
    /// Clients still present when the room stops are disconnected after
    /// [`destroy`](Self::destroy) and then get this call.
    fn client_leave(&mut self, _client: &Arc<Client>) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called for every payload a member sends, in arrival order.
    fn client_data(
        &mut self,
        client: &Arc<Client>,
        payload: Vec<u8>,
    ) -> impl Future<Output = ()> + Send;
}
