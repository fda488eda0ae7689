//! # LobbyLink Client
//!
//! Embeddable client runtime for lobby-based multiplayer sessions.
//!
//! A [`LobbyClient`] keeps one socket to a session server, speaks a JSON
//! text protocol over it, and mirrors the server's view of the current lobby
//! (or legacy room) locally. Embedding code drives it through async lobby
//! operations and observes it through the [`EventBus`].
//!
//! ## Features
//!
//! - **Lobbies**: create, join, leave, list, kick, and close, with host tracking
//! - **Legacy rooms**: handshake-free room join, also used as a startup fallback
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any
//!   backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   `WebSocketConnector`
//! - **Event-driven**: typed [`LobbyEvent`]s delivered to subscribed handlers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lobbylink_client::{ClientConfig, CreateLobbyParams, EventKind, LobbyClient};
//!
//! # async fn run() -> lobbylink_client::Result<()> {
//! let client = LobbyClient::new(
//!     ClientConfig::new("g1")
//!         .with_server_url("ws://localhost:8080")
//!         .with_username("Ann"),
//! );
//!
//! client.subscribe(EventKind::LobbyPlayerJoined, |event| {
//!     println!("{event:?}");
//! });
//!
//! let lobby = client
//!     .create_lobby(CreateLobbyParams::new("PUBLIC_Arena", 4))
//!     .await?;
//! assert!(lobby.is_public);
//! assert!(client.is_host());
//! # Ok(())
//! # }
//! ```

pub mod client;
mod connection;
mod dispatch;
pub mod error;
pub mod event;
pub mod pending;
pub mod platform;
pub mod probe;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod transports;

pub use client::{ClientConfig, CreateLobbyParams, JoinLobbyParams, ListLobbiesParams, LobbyClient};
pub use error::{LobbyError, Result};
pub use event::{EventBus, EventKind, LobbyEvent, SubscriptionId};
pub use pending::LobbySnapshot;
pub use platform::{LaunchOutcome, LobbyContext, PlatformLaunch};
pub use probe::{probe_server, ServerStatus};
pub use protocol::{ClientMessage, LobbyInfo, LobbySummary, PlayerData, RemotePlayer, ServerMessage};
pub use session::Phase;
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
