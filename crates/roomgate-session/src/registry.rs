//! The client registry: every client that currently exists on the server.
//!
//! Room membership and existence are tracked separately. A room's own map
//! says who is *in* the room; this registry says who is *connected to the
//! server at all*. Both hold an `Arc` to the same [`Client`].
//!
//! ## Ownership transfer
//!
//! ```text
//! upgrade ──→ insert() ──→ [registered] ──→ remove() ──→ dropped
//!   (read pump hands        (room joins,     (read pump ends and
//!    its Arc in)             sends, leaves)   takes its Arc back)
//! ```
//!
//! The read pump that inserts a client is the one that removes it, exactly
//! once, after its read loop ends.

use std::collections::HashMap;
use std::sync::Arc;

use roomgate_protocol::ClientId;
use tokio::sync::Mutex;

use crate::{Client, ClientError};

/// A concurrency-safe map of all live clients.
///
/// Every method takes `&self`; the map sits behind an async mutex that is
/// only held for the map operation itself, never across a send or a room
/// callback.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, Arc<Client>>>,
}

impl ClientRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly upgraded client.
    ///
    /// # Errors
    /// Returns [`ClientError::AlreadyRegistered`] if a client with the
    /// same id is already present. The existing entry is left untouched.
    pub async fn insert(&self, client: Arc<Client>) -> Result<(), ClientError> {
        let mut clients = self.clients.lock().await;
        let id = client.id().clone();
        if clients.contains_key(&id) {
            return Err(ClientError::AlreadyRegistered(id));
        }
        clients.insert(id.clone(), client);
        tracing::debug!(client_id = %id, total = clients.len(), "client registered");
        Ok(())
    }

    /// Removes a client, handing its `Arc` back to the caller.
    ///
    /// Returns `None` if the id was never registered (or already removed).
    pub async fn remove(&self, id: &ClientId) -> Option<Arc<Client>> {
        let mut clients = self.clients.lock().await;
        let removed = clients.remove(id);
        if removed.is_some() {
            tracing::debug!(client_id = %id, total = clients.len(), "client unregistered");
        }
        removed
    }

    /// Looks up a client by id.
    pub async fn get(&self, id: &ClientId) -> Option<Arc<Client>> {
        self.clients.lock().await.get(id).cloned()
    }

    /// Whether a client with this id is registered.
    pub async fn contains(&self, id: &ClientId) -> bool {
        self.clients.lock().await.contains_key(id)
    }

    /// Returns the number of registered clients.
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Returns `true` if no clients are registered.
    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }

    /// A point-in-time copy of every registered client.
    ///
    /// The lock is released before returning, so callers can send to the
    /// clients without blocking registrations.
    pub async fn snapshot(&self) -> Vec<Arc<Client>> {
        self.clients.lock().await.values().cloned().collect()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `ClientRegistry`.
    //!
    //! Clients are backed by in-memory duplex pipes; the peer halves are
    //! kept alive for the length of each test so no connection closes
    //! underneath the registry.

    use roomgate_transport::WebSocketConnection;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    use super::*;

    // -- Helpers ----------------------------------------------------------

    async fn client() -> (Arc<Client>, WebSocketStream<DuplexStream>) {
        let (server, peer) = tokio::io::duplex(4096);
        let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
        let peer = WebSocketStream::from_raw_socket(peer, Role::Client, None).await;
        (
            Arc::new(Client::new(WebSocketConnection::from_stream(server))),
            peer,
        )
    }

    // =====================================================================
    // insert()
    // =====================================================================

    #[tokio::test]
    async fn test_insert_new_client_is_registered() {
        let registry = ClientRegistry::new();
        let (c, _peer) = client().await;

        registry.insert(Arc::clone(&c)).await.expect("should insert");

        assert_eq!(registry.len().await, 1);
        assert!(registry.contains(c.id()).await);
        let found = registry.get(c.id()).await.expect("should be found");
        assert!(Arc::ptr_eq(&found, &c));
    }

    #[tokio::test]
    async fn test_insert_duplicate_returns_error() {
        let registry = ClientRegistry::new();
        let (c, _peer) = client().await;
        registry.insert(Arc::clone(&c)).await.unwrap();

        let result = registry.insert(Arc::clone(&c)).await;

        assert!(
            matches!(&result, Err(ClientError::AlreadyRegistered(id)) if id == c.id()),
            "should reject duplicate registration"
        );
        assert_eq!(registry.len().await, 1);
    }

    // =====================================================================
    // remove()
    // =====================================================================

    #[tokio::test]
    async fn test_remove_hands_back_the_client() {
        let registry = ClientRegistry::new();
        let (c, _peer) = client().await;
        registry.insert(Arc::clone(&c)).await.unwrap();

        let removed = registry.remove(c.id()).await.expect("should remove");

        assert!(Arc::ptr_eq(&removed, &c));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_twice_returns_none() {
        let registry = ClientRegistry::new();
        let (c, _peer) = client().await;
        registry.insert(Arc::clone(&c)).await.unwrap();

        assert!(registry.remove(c.id()).await.is_some());
        assert!(registry.remove(c.id()).await.is_none());
    }

    #[tokio::test]
    async fn test_get_unknown_returns_none() {
        let registry = ClientRegistry::new();
        assert!(registry.get(&ClientId::generate()).await.is_none());
    }

    // =====================================================================
    // snapshot()
    // =====================================================================

    #[tokio::test]
    async fn test_snapshot_lists_every_client() {
        let registry = ClientRegistry::new();
        let (a, _pa) = client().await;
        let (b, _pb) = client().await;
        registry.insert(Arc::clone(&a)).await.unwrap();
        registry.insert(Arc::clone(&b)).await.unwrap();

        let mut ids: Vec<ClientId> = registry
            .snapshot()
            .await
            .iter()
            .map(|c| c.id().clone())
            .collect();
        ids.sort();
        let mut expected = vec![a.id().clone(), b.id().clone()];
        expected.sort();

        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_all_land() {
        let registry = Arc::new(ClientRegistry::new());
        let mut peers = Vec::new();
        let mut tasks = Vec::new();

        for _ in 0..16 {
            let (c, peer) = client().await;
            peers.push(peer);
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move { registry.insert(c).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(registry.len().await, 16);
    }
}
