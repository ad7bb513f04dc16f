use std::collections::HashMap;
use std::sync::Arc;

use roomgate::prelude::*;
use tracing_subscriber::EnvFilter;

/// Environment variable naming an optional JSON config file.
const CONFIG_ENV: &str = "ROOMGATE_CONFIG";

/// Log a tick summary every this many ticks.
const STATS_EVERY: u64 = 300;

// ---------------------------------------------------------------------------
// Room logic
// ---------------------------------------------------------------------------

/// Relays every payload to every client in the room, sender included.
struct EchoRoom {
    room_id: RoomId,
    members: HashMap<ClientId, Arc<Client>>,
    ticks: u64,
    last_tick_nanos: u64,
}

impl EchoRoom {
    fn new(room_id: &RoomId) -> Self {
        Self {
            room_id: room_id.clone(),
            members: HashMap::new(),
            ticks: 0,
            last_tick_nanos: 0,
        }
    }
}

impl RoomLogic for EchoRoom {
    async fn init(&mut self) {
        tracing::info!(room_id = %self.room_id, "echo room open");
    }

    async fn destroy(&mut self) {
        tracing::info!(room_id = %self.room_id, ticks = self.ticks, "echo room closed");
        self.members.clear();
    }

    async fn update(&mut self, timestamp_nanos: u64) {
        self.ticks += 1;
        if self.last_tick_nanos != 0 {
            tracing::trace!(
                room_id = %self.room_id,
                dt_us = timestamp_nanos.saturating_sub(self.last_tick_nanos) / 1_000,
                "tick"
            );
        }
        self.last_tick_nanos = timestamp_nanos;

        if self.ticks % STATS_EVERY == 0 {
            tracing::debug!(
                room_id = %self.room_id,
                ticks = self.ticks,
                members = self.members.len(),
                "room alive"
            );
        }
    }

    async fn client_join(&mut self, client: &Arc<Client>) {
        self.members.insert(client.id().clone(), Arc::clone(client));
        tracing::info!(room_id = %self.room_id, client_id = %client.id(), members = self.members.len(), "joined");
    }

    async fn client_leave(&mut self, client: &Arc<Client>) {
        self.members.remove(client.id());
        tracing::info!(room_id = %self.room_id, client_id = %client.id(), members = self.members.len(), "left");
    }

    async fn client_data(&mut self, client: &Arc<Client>, payload: Vec<u8>) {
        tracing::debug!(
            room_id = %self.room_id,
            client_id = %client.id(),
            bytes = payload.len(),
            "relaying"
        );
        for member in self.members.values() {
            if let Err(e) = member.send(&payload).await {
                tracing::debug!(client_id = %member.id(), error = %e, "relay failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn load_config() -> Result<GateConfig, Box<dyn std::error::Error>> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)?;
            tracing::info!(%path, "loaded config");
            Ok(GateConfig::from_json(&json)?)
        }
        Err(_) => Ok(GateConfig::default()),
    }
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => tracing::info!("received SIGINT"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("received Ctrl+C");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let gate = Gate::builder().config(config).build(EchoRoom::new).await?;

    let handle = gate.handle();
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => handle.shutdown(),
            Err(e) => tracing::error!(error = %e, "could not install signal handlers"),
        }
    });

    gate.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    type Ws = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn start() -> (String, GateHandle<EchoRoom>) {
        let gate = Gate::builder()
            .bind("127.0.0.1:0")
            .build(EchoRoom::new)
            .await
            .unwrap();
        let addr = gate.local_addr().unwrap().to_string();
        let handle = gate.handle();
        tokio::spawn(gate.run());
        (addr, handle)
    }

    async fn ws(addr: &str, room: &str) -> Ws {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/{room}"))
            .await
            .unwrap();
        ws
    }

    async fn recv(ws: &mut Ws) -> Vec<u8> {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout")
            .unwrap()
            .unwrap();
        msg.into_data().to_vec()
    }

    async fn wait_for_members(handle: &GateHandle<EchoRoom>, room: &str, n: usize) {
        let id = RoomId::parse(room, room.len()).unwrap();
        for _ in 0..500 {
            if let Some(controller) = handle.room(&id).await {
                if controller.client_count() == n {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room {room} never reached {n} members");
    }

    #[tokio::test]
    async fn test_payload_is_relayed_to_every_member() {
        let (addr, handle) = start().await;
        let mut a = ws(&addr, "lobby001").await;
        let mut b = ws(&addr, "lobby001").await;
        wait_for_members(&handle, "lobby001", 2).await;

        a.send(Message::Binary(b"hi all".to_vec().into())).await.unwrap();

        assert_eq!(recv(&mut a).await, b"hi all");
        assert_eq!(recv(&mut b).await, b"hi all");
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let (addr, handle) = start().await;
        let mut a = ws(&addr, "room-one").await;
        let mut b = ws(&addr, "room-two").await;
        wait_for_members(&handle, "room-one", 1).await;
        wait_for_members(&handle, "room-two", 1).await;

        a.send(Message::Binary(b"only one".to_vec().into())).await.unwrap();
        b.send(Message::Binary(b"only two".to_vec().into())).await.unwrap();

        assert_eq!(recv(&mut a).await, b"only one");
        assert_eq!(recv(&mut b).await, b"only two");
    }
}
