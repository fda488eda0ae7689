#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for LobbyLink client integration tests.
//!
//! Provides a channel-based [`MockConnector`]. Every socket it opens hands
//! its server side to the test as a [`MockServer`], which reads what the
//! client sent and pushes frames back.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use lobbylink_client::{
    ClientConfig, Connector, EventKind, LobbyClient, LobbyError, LobbyEvent, Transport,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// How long helpers wait before declaring that nothing arrived.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub const SERVER_URL: &str = "ws://mock.test";

type Frame = Option<Result<String, LobbyError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// Client side of one mock socket.
pub struct MockTransport {
    /// Frames pushed by the test (`None` = server hung up).
    incoming: mpsc::UnboundedReceiver<Frame>,
    /// Frames the client sent.
    outgoing: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), LobbyError> {
        self.outgoing
            .send(message)
            .map_err(|e| LobbyError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
        // A dropped MockServer reads as the server closing the socket.
        self.incoming.recv().await.flatten()
    }

    async fn close(&mut self) -> Result<(), LobbyError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockServer ──────────────────────────────────────────────────────

/// Server side of one mock socket, driven by the test.
pub struct MockServer {
    push: mpsc::UnboundedSender<Frame>,
    sent: mpsc::UnboundedReceiver<String>,
    /// Whether the client closed the transport.
    pub closed: Arc<AtomicBool>,
}

impl MockServer {
    /// Next frame the client sent, parsed as JSON.
    pub async fn next_sent(&mut self) -> Value {
        let text = tokio::time::timeout(RECV_TIMEOUT, self.sent.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client side of the socket is gone");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Returns the next client frame if one is already queued.
    pub fn try_next_sent(&mut self) -> Option<Value> {
        self.sent
            .try_recv()
            .ok()
            .map(|text| serde_json::from_str(&text).expect("client sent invalid JSON"))
    }

    /// Push a JSON frame to the client.
    pub fn push(&self, frame: Value) {
        self.push_text(frame.to_string());
    }

    /// Push a raw text frame to the client.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.push.send(Some(Ok(text.into())));
    }

    /// Fail the client's next receive with a transport error.
    pub fn fail(&self, message: &str) {
        let _ = self
            .push
            .send(Some(Err(LobbyError::TransportReceive(message.into()))));
    }

    /// Close the socket from the server side.
    pub fn hang_up(&self) {
        let _ = self.push.send(None);
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// What the connector does on `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    Accept,
    Refuse,
    Hang,
}

/// A connector that opens channel-backed sockets.
pub struct MockConnector {
    mode: Arc<StdMutex<ConnectMode>>,
    attempts: Arc<AtomicUsize>,
    accepted: mpsc::UnboundedSender<MockServer>,
}

/// Test-side handle for a [`MockConnector`].
pub struct MockHub {
    mode: Arc<StdMutex<ConnectMode>>,
    attempts: Arc<AtomicUsize>,
    accepted: mpsc::UnboundedReceiver<MockServer>,
}

impl MockConnector {
    pub fn new() -> (Self, MockHub) {
        let mode = Arc::new(StdMutex::new(ConnectMode::Accept));
        let attempts = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                mode: Arc::clone(&mode),
                attempts: Arc::clone(&attempts),
                accepted: tx,
            },
            MockHub {
                mode,
                attempts,
                accepted: rx,
            },
        )
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, LobbyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        match mode {
            ConnectMode::Refuse => Err(LobbyError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
            ConnectMode::Hang => std::future::pending().await,
            ConnectMode::Accept => {
                let (push_tx, push_rx) = mpsc::unbounded_channel();
                let (sent_tx, sent_rx) = mpsc::unbounded_channel();
                let closed = Arc::new(AtomicBool::new(false));
                let _ = self.accepted.send(MockServer {
                    push: push_tx,
                    sent: sent_rx,
                    closed: Arc::clone(&closed),
                });
                Ok(Box::new(MockTransport {
                    incoming: push_rx,
                    outgoing: sent_tx,
                    closed,
                }))
            }
        }
    }
}

impl MockHub {
    /// Server side of the next socket the client opens.
    pub async fn accept(&mut self) -> MockServer {
        tokio::time::timeout(RECV_TIMEOUT, self.accepted.recv())
            .await
            .expect("timed out waiting for the client to connect")
            .expect("connector dropped")
    }

    pub fn set_mode(&self, mode: ConnectMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

// ── Client helpers ──────────────────────────────────────────────────

/// Default test config pointed at the mock server.
pub fn test_config() -> ClientConfig {
    ClientConfig::new("g1")
        .with_server_url(SERVER_URL)
        .with_username("Ann")
}

/// Build a client over a fresh mock connector.
pub fn start_client(config: ClientConfig) -> (LobbyClient, MockHub) {
    let (connector, hub) = MockConnector::new();
    (LobbyClient::with_connector(config, connector), hub)
}

/// Receives every event a client publishes.
pub struct EventLog {
    rx: mpsc::UnboundedReceiver<LobbyEvent>,
}

impl EventLog {
    pub fn attach(client: &LobbyClient) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        client.subscribe_all(move |event| {
            let _ = tx.send(event.clone());
        });
        Self { rx }
    }

    /// Next event, failing the test if none arrives in time.
    pub async fn next(&mut self) -> LobbyEvent {
        tokio::time::timeout(RECV_TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event bus dropped")
    }

    /// Next event of `kind`, skipping others.
    pub async fn next_of(&mut self, kind: EventKind) -> LobbyEvent {
        loop {
            let event = self.next().await;
            if event.kind() == kind {
                return event;
            }
        }
    }

    /// Everything already published, without waiting.
    pub fn drain(&mut self) -> Vec<LobbyEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

// ── JSON helpers ────────────────────────────────────────────────────

/// A `lobby_created` confirmation.
pub fn lobby_created_json(lobby_id: &str, lobby_name: &str, player_id: &str) -> Value {
    json!({
        "type": "lobby_created",
        "lobbyId": lobby_id,
        "lobbyName": lobby_name,
        "isPublic": lobby_name.starts_with("PUBLIC_"),
        "maxPlayers": 4,
        "playerId": player_id,
    })
}

/// A `lobby_state` snapshot with the given `(id, username)` members.
pub fn lobby_state_json(lobby_id: &str, owner_id: &str, players: &[(&str, &str)]) -> Value {
    let players: Vec<Value> = players
        .iter()
        .map(|(id, username)| json!({"id": id, "username": username, "data": {}}))
        .collect();
    json!({
        "type": "lobby_state",
        "lobbyId": lobby_id,
        "lobbyName": "Arena",
        "isPublic": false,
        "ownerId": owner_id,
        "maxPlayers": 4,
        "players": players,
    })
}

pub fn error_json(message: &str) -> Value {
    json!({"type": "error", "message": message})
}
