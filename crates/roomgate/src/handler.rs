//! Per-connection handler: upgrade, room placement, and the read pump.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Upgrade → room id checked in the handshake, 400 on a bad length
//!   2. Wrap in a `Client` → register it with the client registry
//!   3. Resolve the room → reuse it, or create, hook, init and start it
//!   4. Join → loop: read payload → hand it to the room
//!   5. Leave → close → unregister → release the room membership

use std::sync::Arc;

use roomgate_protocol::RoomId;
use roomgate_room::{Admission, RoomController, RoomLogic};
use roomgate_session::Client;
use roomgate_transport::PendingConnection;

use crate::server::GateState;
use crate::GateError;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<L: RoomLogic>(
    pending: PendingConnection,
    state: Arc<GateState<L>>,
) -> Result<(), GateError> {
    let peer = pending.peer_addr();

    // --- Step 1: Upgrade ---
    let upgrade = pending.upgrade(state.config.room_id_len, state.config.handshake_timeout());
    let (room_id, conn) = tokio::select! {
        () = state.shutdown.cancelled() => return Ok(()),
        upgraded = upgrade => upgraded?,
    };

    // --- Step 2: Register ---
    let client = Arc::new(Client::new(conn));
    state.clients.insert(Arc::clone(&client)).await?;
    tracing::info!(client_id = %client.id(), %room_id, %peer, "client connected");

    // --- Step 3: Resolve the room ---
    let controller = match resolve_controller(&state, &room_id).await {
        Ok(controller) => controller,
        Err(e) => {
            retire(&state, &client).await;
            return Err(e);
        }
    };

    // --- Steps 4 and 5: Serve, then clean up ---
    let served = serve_client(&client, &controller).await;
    retire(&state, &client).await;
    state.rooms.release(&controller).await;

    tracing::info!(client_id = %client.id(), %room_id, "client disconnected");
    served
}

/// Finds the live controller for `room_id`, creating it if needed.
///
/// Creation runs the hook and `init` while the new room is still locked,
/// so clients racing in behind us wait until the room is ready.
async fn resolve_controller<L: RoomLogic>(
    state: &GateState<L>,
    room_id: &RoomId,
) -> Result<Arc<RoomController<L>>, GateError> {
    let admission = state
        .rooms
        .admit(room_id, &state.config.room, || (state.factory)(room_id))
        .await?;

    Ok(match admission {
        Admission::Existing(controller) => controller,
        Admission::Created(pending) => {
            if let Some(hook) = &state.on_room_created {
                hook(pending.controller());
            }
            pending.launch().await
        }
    })
}

/// Joins the room and pumps payloads into it until the connection ends.
async fn serve_client<L: RoomLogic>(
    client: &Arc<Client>,
    controller: &RoomController<L>,
) -> Result<(), GateError> {
    controller.client_join(client).await?;

    loop {
        match client.read_next().await {
            Ok(payload) => controller.client_data(client, payload).await,
            Err(e) if e.is_graceful_close() => {
                tracing::debug!(
                    client_id = %client.id(),
                    room_id = %controller.id(),
                    reason = %e,
                    "connection closed"
                );
                break;
            }
            Err(e) => {
                tracing::warn!(
                    client_id = %client.id(),
                    room_id = %controller.id(),
                    error = %e,
                    "connection failed"
                );
                break;
            }
        }
    }

    controller.client_leave(client).await;
    Ok(())
}

/// Closes the connection if it is still open and drops the client from
/// the registry.
async fn retire<L: RoomLogic>(state: &GateState<L>, client: &Arc<Client>) {
    if client.is_connected() {
        if let Err(e) = client.disconnect().await {
            tracing::debug!(client_id = %client.id(), error = %e, "close failed");
        }
    }
    state.clients.remove(client.id()).await;
}
