//! # Basic Lobby Example
//!
//! A complete lobby session over WebSocket:
//!
//! 1. Probe the server
//! 2. List public lobbies and join the first one, or create a new one
//! 3. Log lobby events (players joining and leaving, owner changes, kicks)
//! 4. Disconnect gracefully on Ctrl+C or when the lobby ends
//!
//! ## Running
//!
//! ```sh
//! # Start a lobby server on localhost:8080, then:
//! cargo run --example basic_lobby
//!
//! # Override the server URL:
//! LOBBYLINK_URL=ws://my-server:8080 cargo run --example basic_lobby
//! ```

use std::time::Duration;

use lobbylink_client::{
    probe_server, ClientConfig, CreateLobbyParams, JoinLobbyParams, ListLobbiesParams, LobbyClient,
    LobbyEvent, WebSocketConnector,
};
use tokio::sync::mpsc;

/// Default server URL when `LOBBYLINK_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let url = std::env::var("LOBBYLINK_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());

    // ── Reachability ────────────────────────────────────────────────
    let status = probe_server(&WebSocketConnector, &url, Duration::from_secs(3)).await;
    if !status.online {
        return Err(format!("server at {url} is offline").into());
    }
    tracing::info!(latency = ?status.latency, "server at {url} is online");

    let client = LobbyClient::new(
        ClientConfig::new("demo-game")
            .with_server_url(&url)
            .with_username("Demo"),
    );

    // Forward events to this task so the handler stays cheap.
    let (event_tx, mut events) = mpsc::unbounded_channel();
    client.subscribe_all(move |event| {
        let _ = event_tx.send(event.clone());
    });

    // ── Join or create ──────────────────────────────────────────────
    let lobbies = client.list_lobbies(ListLobbiesParams::default()).await;
    tracing::info!("{} public lobbies", lobbies.len());

    match lobbies.iter().find(|l| l.player_count < l.max_players) {
        Some(open) => {
            let snapshot = client
                .join_lobby(JoinLobbyParams::new(&open.lobby_id))
                .await?;
            tracing::info!(
                "joined {} with {} players",
                snapshot.lobby.lobby_name,
                snapshot.players.len()
            );
        }
        None => {
            let lobby = client
                .create_lobby(CreateLobbyParams::new("PUBLIC_Demo", 4))
                .await?;
            tracing::info!("created {} ({})", lobby.lobby_name, lobby.lobby_id);
        }
    }

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    LobbyEvent::LobbyPlayerJoined { player } => {
                        tracing::info!("{} joined", player.username);
                        if client.is_host() {
                            client.send_custom("welcome", serde_json::json!({"to": player.id}));
                        }
                    }
                    LobbyEvent::LobbyPlayerLeft { username, reason, .. } => {
                        tracing::info!("{username} left ({})", reason.as_deref().unwrap_or("-"));
                    }
                    LobbyEvent::LobbyOwnerChanged { owner_id, is_host } => {
                        tracing::info!("owner is now {owner_id} (host: {is_host})");
                    }
                    LobbyEvent::LobbyKicked { reason } | LobbyEvent::LobbyClosed { reason } => {
                        tracing::info!("lobby ended: {}", reason.as_deref().unwrap_or("-"));
                        break;
                    }
                    LobbyEvent::Disconnected { reason } => {
                        tracing::warn!("disconnected: {}", reason.as_deref().unwrap_or("server closed"));
                        break;
                    }
                    other => tracing::debug!("event: {other:?}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving");
                client.leave_lobby();
                break;
            }
        }
    }

    client.disconnect().await;
    Ok(())
}
