//! The lobby client: session handle and lobby state machine.
//!
//! [`LobbyClient`] is a cheaply cloneable handle to one session. It opens the
//! socket on demand, runs the create/join/list handshakes, and keeps the
//! mirrored lobby/room state that inbound frames mutate. Embedding code
//! observes everything through the [`EventBus`].
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ClientConfig::new("g1")
//!     .with_server_url("ws://localhost:8080")
//!     .with_username("Ann");
//! let client = LobbyClient::new(config);
//!
//! client.subscribe(EventKind::LobbyKicked, |event| {
//!     tracing::info!(?event, "removed from lobby");
//! });
//!
//! let lobby = client
//!     .create_lobby(CreateLobbyParams::new("PUBLIC_Arena", 4))
//!     .await?;
//! assert!(client.is_host());
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionManager, LinkClosed, LinkObserver};
use crate::dispatch;
use crate::error::{LobbyError, Result};
use crate::event::{EventBus, EventKind, LobbyEvent, SubscriptionId};
use crate::pending::{LobbySnapshot, PendingRequests, RequestId};
use crate::protocol::{ClientMessage, LobbyInfo, LobbySummary, PlayerData, RemotePlayer};
use crate::session::{Phase, SessionState};
use crate::transport::Connector;

/// Default time allowed for the socket to open.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

/// Default time to wait for a lobby listing before settling on `[]`.
const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for the graceful socket close.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

const DEFAULT_USERNAME: &str = "Player";

/// Smallest accepted connect/list timeout.
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`LobbyClient`].
///
/// # Example
///
/// ```
/// use lobbylink_client::client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("g1")
///     .with_server_url("ws://localhost:8080")
///     .with_list_timeout(Duration::from_secs(2));
/// assert_eq!(config.game_id, "g1");
/// assert_eq!(config.connect_timeout, Duration::from_secs(8));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Game the session plays.
    pub game_id: String,
    /// Session server URL. `None` keeps the client offline.
    pub server_url: Option<String>,
    /// Display name. Defaults to `"Player"`.
    pub username: String,
    /// Player id to reuse, e.g. one restored from a cookie. Generated on the
    /// first connection attempt when absent.
    pub player_id: Option<String>,
    /// Time allowed for the socket to open. Defaults to **8 seconds**.
    pub connect_timeout: Duration,
    /// Time to wait for a lobby listing. Defaults to **5 seconds**.
    pub list_timeout: Duration,
    /// Deadline for create/join handshakes. `None` (the default) waits until
    /// the server answers or the connection drops.
    pub handshake_timeout: Option<Duration>,
    /// Time the transport loop gets to close gracefully on
    /// [`LobbyClient::disconnect`]. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl ClientConfig {
    pub fn new(game_id: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            server_url: None,
            username: DEFAULT_USERNAME.to_string(),
            player_id: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            list_timeout: DEFAULT_LIST_TIMEOUT,
            handshake_timeout: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    #[must_use]
    pub fn with_player_id(mut self, player_id: impl Into<String>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }

    /// Values below 1 ms are clamped to 1 ms.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout.max(MIN_TIMEOUT);
        self
    }

    /// Values below 1 ms are clamped to 1 ms.
    #[must_use]
    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout.max(MIN_TIMEOUT);
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Operation parameters ────────────────────────────────────────────

/// Parameters for [`LobbyClient::create_lobby`].
///
/// `game_id` and `username`, when set, replace the session's values before
/// the request is sent. Prefix the name with
/// [`PUBLIC_LOBBY_PREFIX`](crate::protocol::PUBLIC_LOBBY_PREFIX) to list the
/// lobby publicly.
#[derive(Debug, Clone, Default)]
pub struct CreateLobbyParams {
    pub lobby_name: String,
    pub max_players: u32,
    /// Preferred lobby id. The server picks one when `None`.
    pub lobby_id: Option<String>,
    pub game_id: Option<String>,
    pub username: Option<String>,
}

impl CreateLobbyParams {
    pub fn new(lobby_name: impl Into<String>, max_players: u32) -> Self {
        Self {
            lobby_name: lobby_name.into(),
            max_players,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_lobby_id(mut self, lobby_id: impl Into<String>) -> Self {
        self.lobby_id = Some(lobby_id.into());
        self
    }

    #[must_use]
    pub fn with_game_id(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Parameters for [`LobbyClient::join_lobby`].
#[derive(Debug, Clone, Default)]
pub struct JoinLobbyParams {
    pub lobby_id: String,
    pub game_id: Option<String>,
    pub username: Option<String>,
}

impl JoinLobbyParams {
    pub fn new(lobby_id: impl Into<String>) -> Self {
        Self {
            lobby_id: lobby_id.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_game_id(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Parameters for [`LobbyClient::list_lobbies`]. Lists the session's game
/// unless `game_id` is set.
#[derive(Debug, Clone, Default)]
pub struct ListLobbiesParams {
    pub game_id: Option<String>,
}

impl ListLobbiesParams {
    #[must_use]
    pub fn with_game_id(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State and handshakes, guarded together so the dispatcher settles a
/// handshake in the same critical section that applies its response.
#[derive(Debug, Default)]
struct Core {
    state: SessionState,
    pending: PendingRequests,
}

pub(crate) struct Inner {
    config: ClientConfig,
    conn: ConnectionManager,
    core: Mutex<Core>,
    bus: EventBus,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_all(&self, events: Vec<LobbyEvent>) {
        for event in &events {
            self.bus.publish(event);
        }
    }

    /// Unexpected or requested loss of the socket. The only place that
    /// resets connection state.
    fn handle_closed(&self, generation: u64, closed: LinkClosed) {
        if !self.conn.retire(generation) {
            debug!(generation, "ignoring close of superseded socket");
            return;
        }
        {
            let mut core = self.lock();
            core.state.reset_connection();
            core.pending.fail_all();
        }
        info!(reason = ?closed.reason, "disconnected");
        if let Some(message) = closed.failure {
            self.bus.publish(&LobbyEvent::Error { message });
        }
        self.bus.publish(&LobbyEvent::Disconnected {
            reason: closed.reason,
        });
    }
}

impl LinkObserver for Inner {
    fn on_frame(&self, text: &str) {
        let Some(msg) = dispatch::decode(text) else {
            return;
        };
        let events = {
            let mut core = self.lock();
            let Core { state, pending } = &mut *core;
            dispatch::route(state, pending, msg)
        };
        self.publish_all(events);
    }

    fn on_closed(&self, generation: u64, closed: LinkClosed) {
        self.handle_closed(generation, closed);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // No executor is available to close gracefully here.
        self.conn.abort();
    }
}

/// Marks the session as connecting for as long as it lives.
struct InFlight<'a> {
    inner: &'a Inner,
}

impl<'a> InFlight<'a> {
    fn begin(inner: &'a Inner) -> Self {
        inner.lock().state.in_flight += 1;
        Self { inner }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut core = self.inner.lock();
        core.state.in_flight = core.state.in_flight.saturating_sub(1);
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to one multiplayer session.
///
/// Clones share the same session. The socket is closed without a handshake
/// when the last clone is dropped; call [`disconnect`](Self::disconnect) for
/// a graceful close.
#[derive(Clone)]
pub struct LobbyClient {
    inner: Arc<Inner>,
}

impl LobbyClient {
    /// Create a client that connects over WebSocket.
    #[cfg(feature = "transport-websocket")]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, crate::transports::WebSocketConnector)
    }

    /// Create a client that opens sockets through `connector`.
    pub fn with_connector(config: ClientConfig, connector: impl Connector) -> Self {
        let conn = ConnectionManager::new(
            Arc::new(connector),
            config.connect_timeout,
            config.shutdown_timeout,
        );
        let mut state = SessionState::default();
        state.session.player_id = config.player_id.clone();
        state.session.username = config.username.clone();
        state.session.game_id = config.game_id.clone();
        state.server_url = config.server_url.clone();

        Self {
            inner: Arc::new(Inner {
                config,
                conn,
                core: Mutex::new(Core {
                    state,
                    pending: PendingRequests::default(),
                }),
                bus: EventBus::new(),
            }),
        }
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&LobbyEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(kind, handler)
    }

    /// Register `handler` for every event.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LobbyEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe_all(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.bus.unsubscribe(id)
    }

    /// The bus events are published on.
    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The local player id, once assigned.
    pub fn player_id(&self) -> Option<String> {
        self.inner.lock().state.session.player_id.clone()
    }

    pub fn username(&self) -> String {
        self.inner.lock().state.session.username.clone()
    }

    pub fn game_id(&self) -> String {
        self.inner.lock().state.session.game_id.clone()
    }

    pub fn server_url(&self) -> Option<String> {
        self.inner.lock().state.server_url.clone()
    }

    /// Point later connections at a different server (or none).
    pub fn set_server_url(&self, url: Option<String>) {
        self.inner.lock().state.server_url = url;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().state.session.connected
    }

    /// The current lobby, if the session is a member.
    pub fn lobby(&self) -> Option<LobbyInfo> {
        self.inner.lock().state.lobby.clone()
    }

    /// `true` when the local player owns the current lobby.
    pub fn is_host(&self) -> bool {
        self.inner.lock().state.is_host()
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().state.phase()
    }

    /// The legacy room id, if the session joined one.
    pub fn room_id(&self) -> Option<String> {
        self.inner.lock().state.room_id.clone()
    }

    /// Known remote players, in first-seen order.
    pub fn players(&self) -> Vec<RemotePlayer> {
        self.inner.lock().state.roster.to_vec()
    }

    pub fn player(&self, id: &str) -> Option<RemotePlayer> {
        self.inner.lock().state.roster.get(id).cloned()
    }

    // ── Connection ──────────────────────────────────────────────────

    /// Open the socket if it is not already open.
    ///
    /// Assigns the player id on first use. Failures are also published as an
    /// `error` event.
    ///
    /// # Errors
    ///
    /// [`LobbyError::NoServerUrl`] without a server URL,
    /// [`LobbyError::ConnectTimeout`] if the socket does not open in time, or
    /// the connector's error if it is refused.
    pub async fn connect(&self) -> Result<()> {
        let _in_flight = InFlight::begin(&self.inner);
        self.ensure_open().await
    }

    /// Close the socket gracefully and reset the session to idle.
    ///
    /// Publishes `disconnected` with reason `"client shut down"`. Outstanding
    /// create/join calls fail with [`LobbyError::Disconnected`].
    pub async fn disconnect(&self) {
        debug!("disconnect requested");
        if let Some(generation) = self.inner.conn.close().await {
            self.inner
                .handle_closed(generation, LinkClosed::requested());
        }
    }

    // ── Lobby operations ────────────────────────────────────────────

    /// Create a lobby and become its owner.
    ///
    /// Resolves once the server confirms with `lobby_created`; at that point
    /// [`is_host`](Self::is_host) is `true` and `lobbyCreated` has been
    /// published.
    ///
    /// # Errors
    ///
    /// Any [`connect`](Self::connect) error; [`LobbyError::Server`] if the
    /// server answers with `error`; [`LobbyError::Disconnected`] if the socket
    /// drops first; [`LobbyError::Timeout`] past the handshake timeout.
    pub async fn create_lobby(&self, params: CreateLobbyParams) -> Result<LobbyInfo> {
        let _in_flight = InFlight::begin(&self.inner);
        self.apply_identity(params.game_id, params.username);
        self.ensure_open().await?;

        let (id, rx, msg) = {
            let mut core = self.inner.lock();
            let player_id = core.state.session.ensure_player_id();
            let msg = ClientMessage::LobbyCreate {
                game_id: core.state.session.game_id.clone(),
                lobby_id: params.lobby_id,
                lobby_name: params.lobby_name,
                max_players: params.max_players,
                player_id,
                username: core.state.session.username.clone(),
            };
            let (id, rx) = core.pending.register_create();
            (id, rx, msg)
        };
        info!("requesting lobby creation");
        self.send_handshake(id, &msg)?;
        self.await_handshake(id, rx).await
    }

    /// Join an existing lobby.
    ///
    /// Resolves with the `lobby_state` snapshot once the server accepts;
    /// [`is_host`](Self::is_host) then reflects the snapshot's owner.
    ///
    /// # Errors
    ///
    /// Same as [`create_lobby`](Self::create_lobby).
    pub async fn join_lobby(&self, params: JoinLobbyParams) -> Result<LobbySnapshot> {
        let _in_flight = InFlight::begin(&self.inner);
        self.apply_identity(params.game_id, params.username);
        self.ensure_open().await?;

        let (id, rx, msg) = {
            let mut core = self.inner.lock();
            let player_id = core.state.session.ensure_player_id();
            let msg = ClientMessage::LobbyJoin {
                game_id: core.state.session.game_id.clone(),
                lobby_id: params.lobby_id,
                player_id,
                username: core.state.session.username.clone(),
            };
            let (id, rx) = core.pending.register_join();
            (id, rx, msg)
        };
        info!("requesting to join lobby");
        self.send_handshake(id, &msg)?;
        self.await_handshake(id, rx).await
    }

    /// Leave the current lobby without waiting for the server.
    ///
    /// Always leaves the session idle with no lobby and no remote players.
    /// Publishes `lobbyLeft` if a lobby was actually left.
    pub fn leave_lobby(&self) {
        self.inner.conn.send(&ClientMessage::LobbyLeave);
        let was_member = {
            let mut core = self.inner.lock();
            let was_member = core.state.lobby.is_some();
            core.state.clear_membership();
            was_member
        };
        if was_member {
            debug!("state: left lobby");
            self.inner
                .bus
                .publish(&LobbyEvent::LobbyLeft { reason: None });
        }
    }

    /// Fetch the public lobby listing.
    ///
    /// Never fails: a connection failure, a dropped socket, or no answer
    /// within the list timeout all yield an empty list.
    pub async fn list_lobbies(&self, params: ListLobbiesParams) -> Vec<LobbySummary> {
        if let Err(e) = self.ensure_open().await {
            debug!("lobby listing unavailable: {e}");
            return Vec::new();
        }

        let (id, rx, msg) = {
            let mut core = self.inner.lock();
            let game_id = params
                .game_id
                .unwrap_or_else(|| core.state.session.game_id.clone());
            let (id, rx) = core.pending.register_list();
            (id, rx, ClientMessage::LobbyList { game_id })
        };
        if !self.inner.conn.send(&msg) {
            self.cancel(id);
            return Vec::new();
        }

        match tokio::time::timeout(self.inner.config.list_timeout, rx).await {
            Ok(Ok(lobbies)) => lobbies,
            Ok(Err(_)) => Vec::new(),
            Err(_) => {
                debug!("no lobby listing within {:?}", self.inner.config.list_timeout);
                self.cancel(id);
                Vec::new()
            }
        }
    }

    /// Ask the server to remove `target_id` from the lobby. Only the owner's
    /// request has any effect; the server enforces that.
    pub fn kick_from_lobby(&self, target_id: impl Into<String>) {
        self.inner.conn.send(&ClientMessage::LobbyKick {
            target_id: target_id.into(),
        });
    }

    /// Ask the server to close the lobby (owner only, enforced server-side).
    pub fn close_lobby(&self) {
        self.inner.conn.send(&ClientMessage::LobbyClose);
    }

    // ── Legacy room ─────────────────────────────────────────────────

    /// Join a legacy room directly, without a handshake.
    ///
    /// Leaves any lobby membership behind. Membership updates then arrive as
    /// `roomState` / `playerJoined` / `playerLeft` events.
    ///
    /// # Errors
    ///
    /// Any [`connect`](Self::connect) error, or [`LobbyError::Disconnected`]
    /// if the socket dropped before the join was sent.
    pub async fn join_room(&self, room_id: impl Into<String>) -> Result<()> {
        let room_id = room_id.into();
        let _in_flight = InFlight::begin(&self.inner);
        self.ensure_open().await?;

        let msg = {
            let mut core = self.inner.lock();
            let player_id = core.state.session.ensure_player_id();
            core.state.clear_membership();
            core.state.room_id = Some(room_id.clone());
            ClientMessage::Join {
                game_id: core.state.session.game_id.clone(),
                room_id: room_id.clone(),
                player_id,
                username: core.state.session.username.clone(),
            }
        };
        if !self.inner.conn.send(&msg) {
            self.inner.lock().state.room_id = None;
            return Err(LobbyError::Disconnected);
        }
        info!(room_id = %room_id, "joined legacy room");
        Ok(())
    }

    // ── Relay ───────────────────────────────────────────────────────

    /// Broadcast local player data; peers merge it into their view.
    /// Dropped silently when the socket is not open.
    pub fn send_state_update(&self, data: PlayerData) {
        let Some(player_id) = self.player_id() else {
            debug!("no player id yet, dropping state update");
            return;
        };
        self.inner
            .conn
            .send(&ClientMessage::StateUpdate { player_id, data });
    }

    /// Relay an application-defined message to the other members.
    /// Dropped silently when the socket is not open.
    pub fn send_custom(&self, event: impl Into<String>, data: Value) {
        let Some(player_id) = self.player_id() else {
            debug!("no player id yet, dropping custom message");
            return;
        };
        self.inner.conn.send(&ClientMessage::Custom {
            player_id,
            event: event.into(),
            data,
        });
    }

    // ── Internal helpers ────────────────────────────────────────────

    pub(crate) fn apply_identity(&self, game_id: Option<String>, username: Option<String>) {
        let mut core = self.inner.lock();
        if let Some(game_id) = game_id {
            core.state.session.game_id = game_id;
        }
        if let Some(username) = username {
            core.state.session.username = username;
        }
    }

    async fn ensure_open(&self) -> Result<()> {
        let url = {
            let mut core = self.inner.lock();
            core.state.session.ensure_player_id();
            core.state.server_url.clone()
        };
        let url = url.ok_or(LobbyError::NoServerUrl)?;

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let observer: Weak<dyn LinkObserver> = weak;
        match self.inner.conn.open(&url, observer).await {
            Ok(false) => Ok(()),
            Ok(true) => {
                let connected = {
                    let mut core = self.inner.lock();
                    // The loop may already have died and reset the session.
                    if self.inner.conn.is_open() {
                        core.state.session.connected = true;
                    }
                    core.state.session.connected
                };
                if !connected {
                    return Err(LobbyError::Disconnected);
                }
                self.inner.bus.publish(&LobbyEvent::Connected);
                Ok(())
            }
            Err(e) => {
                self.inner.lock().state.reset_connection();
                self.inner.bus.publish(&LobbyEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn send_handshake(&self, id: RequestId, msg: &ClientMessage) -> Result<()> {
        if self.inner.conn.send(msg) {
            Ok(())
        } else {
            self.cancel(id);
            Err(LobbyError::Disconnected)
        }
    }

    async fn await_handshake<T>(
        &self,
        id: RequestId,
        rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        let outcome = match self.inner.config.handshake_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(timeout = ?limit, "handshake timed out");
                    self.cancel(id);
                    return Err(LobbyError::Timeout);
                }
            },
            None => rx.await,
        };
        outcome.unwrap_or(Err(LobbyError::Disconnected))
    }

    fn cancel(&self, id: RequestId) {
        self.inner.lock().pending.cancel(id);
    }
}

impl std::fmt::Debug for LobbyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.inner.lock();
        f.debug_struct("LobbyClient")
            .field("player_id", &core.state.session.player_id)
            .field("connected", &core.state.session.connected)
            .field("phase", &core.state.phase())
            .field("pending", &core.pending)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(
            &self,
            _url: &str,
        ) -> std::result::Result<Box<dyn crate::transport::Transport>, LobbyError> {
            Err(LobbyError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )))
        }
    }

    #[test]
    fn config_defaults() {
        let config = ClientConfig::new("g1");
        assert_eq!(config.game_id, "g1");
        assert_eq!(config.username, "Player");
        assert!(config.server_url.is_none());
        assert!(config.player_id.is_none());
        assert_eq!(config.connect_timeout, Duration::from_secs(8));
        assert_eq!(config.list_timeout, Duration::from_secs(5));
        assert!(config.handshake_timeout.is_none());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn zero_timeouts_are_clamped() {
        let config = ClientConfig::new("g1")
            .with_connect_timeout(Duration::ZERO)
            .with_list_timeout(Duration::ZERO);
        assert_eq!(config.connect_timeout, MIN_TIMEOUT);
        assert_eq!(config.list_timeout, MIN_TIMEOUT);
    }

    #[test]
    fn seeded_player_id_is_kept() {
        let client = LobbyClient::with_connector(
            ClientConfig::new("g1").with_player_id("p_saved"),
            RefusingConnector,
        );
        assert_eq!(client.player_id().as_deref(), Some("p_saved"));
        assert_eq!(client.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn connect_without_url_fails_fast() {
        let client = LobbyClient::with_connector(ClientConfig::new("g1"), RefusingConnector);
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, LobbyError::NoServerUrl));
        assert!(!client.is_connected());
        // The id is still assigned on the first attempt.
        assert!(client.player_id().unwrap().starts_with("p_"));
    }

    #[tokio::test]
    async fn refused_connect_publishes_error() {
        let client = LobbyClient::with_connector(
            ClientConfig::new("g1").with_server_url("ws://nowhere"),
            RefusingConnector,
        );
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        client.subscribe(EventKind::Error, move |e| {
            sink.lock().unwrap().push(e.clone());
        });

        let err = client
            .create_lobby(CreateLobbyParams::new("Arena", 4))
            .await
            .unwrap_err();
        assert!(matches!(err, LobbyError::Io(_)));
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert_eq!(client.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn list_without_server_is_empty() {
        let client = LobbyClient::with_connector(ClientConfig::new("g1"), RefusingConnector);
        assert!(client.list_lobbies(ListLobbiesParams::default()).await.is_empty());
    }

    #[test]
    fn leave_lobby_offline_is_harmless() {
        let client = LobbyClient::with_connector(ClientConfig::new("g1"), RefusingConnector);
        client.leave_lobby();
        client.kick_from_lobby("p_x");
        client.close_lobby();
        client.send_state_update(PlayerData::new());
        assert!(client.lobby().is_none());
        assert!(client.players().is_empty());
    }
}
