//! # Custom Transport Example
//!
//! Implements [`Transport`] and [`Connector`] over in-process channels and
//! runs a tiny fake lobby server behind them. Useful as a template for:
//!
//! - **Testing**: drive game logic without a real server
//! - **Custom backends**: adapt any I/O layer (TCP, QUIC, WebRTC data channels)
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_transport
//! ```

use async_trait::async_trait;
use lobbylink_client::{
    ClientConfig, Connector, CreateLobbyParams, EventKind, LobbyClient, LobbyError, LobbyEvent,
    Transport,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-backed transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of a loopback socket.
pub struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), LobbyError> {
        self.tx
            .send(message)
            .map_err(|e| LobbyError::TransportSend(e.to_string()))
    }

    /// `None` once the server half is dropped. Cancel-safe because
    /// `UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), LobbyError> {
        self.rx.close();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A connector that spawns a fake server per connection
// ─────────────────────────────────────────────────────────────────────

pub struct LoopbackConnector;

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, LobbyError> {
        tracing::info!("loopback connect to {url}");
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        tokio::spawn(fake_server(server_rx, server_tx));
        Ok(Box::new(LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        }))
    }
}

/// Answers create and list requests, then greets the owner with a peer.
async fn fake_server(mut rx: mpsc::UnboundedReceiver<String>, tx: mpsc::UnboundedSender<String>) {
    let reply = |frame: Value| {
        let _ = tx.send(frame.to_string());
    };
    while let Some(text) = rx.recv().await {
        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        match frame["type"].as_str() {
            Some("lobby_create") => {
                reply(json!({
                    "type": "lobby_created",
                    "lobbyId": "L-loop",
                    "lobbyName": frame["lobbyName"],
                    "isPublic": true,
                    "maxPlayers": frame["maxPlayers"],
                    "playerId": frame["playerId"],
                }));
                reply(json!({"type": "lobby_player_joined", "playerId": "p_bot", "username": "Bot"}));
                reply(json!({"type": "state_update", "playerId": "p_bot", "data": {"ready": true}}));
            }
            Some("lobby_list") => reply(json!({"type": "lobby_list", "lobbies": []})),
            Some("lobby_close") => reply(json!({"type": "lobby_closed", "reason": "owner closed"})),
            _ => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Drive a client against it
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let client = LobbyClient::with_connector(
        ClientConfig::new("loop-game")
            .with_server_url("loopback://local")
            .with_username("Host"),
        LoopbackConnector,
    );

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    client.subscribe(EventKind::StateUpdate, move |event| {
        if let LobbyEvent::StateUpdate { player_id, data } = event {
            tracing::info!("{player_id} is now {data:?}");
            let _ = done_tx.send(());
        }
    });
    client.subscribe(EventKind::LobbyClosed, |event| {
        tracing::info!("closed: {event:?}");
    });

    let lobby = client
        .create_lobby(CreateLobbyParams::new("PUBLIC_Loop", 2))
        .await?;
    tracing::info!(
        "created {} (public: {}, host: {})",
        lobby.lobby_name,
        lobby.is_public,
        client.is_host()
    );

    // Wait for the bot to report ready, then tear everything down.
    done_rx.recv().await;
    tracing::info!("players: {:?}", client.players());
    client.close_lobby();
    client.disconnect().await;
    tracing::info!("done, phase = {:?}", client.phase());
    Ok(())
}
