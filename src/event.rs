//! Events published to embedding game code, and the bus that delivers them.
//!
//! Subscribers register a handler for one [`EventKind`] (or for every kind)
//! and get back a [`SubscriptionId`] to unsubscribe with. Handlers run
//! synchronously, in subscription order, on whichever task published the
//! event: the transport loop for server-driven events, the caller's task for
//! locally-driven ones.
//!
//! A panicking handler is isolated: the panic is caught and logged with
//! `tracing::error!`, and the remaining handlers still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::error;

use crate::protocol::{LobbyInfo, LobbySummary, PlayerData, RemotePlayer};

/// Events emitted by the [`LobbyClient`](crate::LobbyClient).
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    /// The socket opened.
    Connected,
    /// The socket closed. All lobby, room, and peer state has been reset.
    Disconnected { reason: Option<String> },
    /// A transport failure or a server `error` message.
    Error { message: String },
    /// Platform startup finished (see [`LobbyClient::launch`](crate::LobbyClient::launch)).
    Ready { multiplayer: bool },
    /// The local player created a lobby and owns it.
    LobbyCreated { lobby: LobbyInfo },
    /// The local player joined a lobby.
    LobbyJoined {
        lobby: LobbyInfo,
        players: Vec<RemotePlayer>,
    },
    /// The server removed the local player from the lobby.
    LobbyLeft { reason: Option<String> },
    /// The local player was kicked.
    LobbyKicked { reason: Option<String> },
    /// The lobby was torn down.
    LobbyClosed { reason: Option<String> },
    LobbyPlayerJoined { player: RemotePlayer },
    LobbyPlayerLeft {
        player_id: String,
        username: String,
        reason: Option<String>,
    },
    LobbyOwnerChanged { owner_id: String, is_host: bool },
    /// A public lobby listing arrived.
    LobbyList { lobbies: Vec<LobbySummary> },
    /// Legacy room: a peer joined.
    PlayerJoined { player: RemotePlayer },
    /// Legacy room: a peer left.
    PlayerLeft { player_id: String },
    /// Legacy room: full member snapshot.
    RoomState { players: Vec<RemotePlayer> },
    /// A peer's data changed. `data` is the merged result.
    StateUpdate { player_id: String, data: PlayerData },
    /// Application-defined message relayed by the server.
    Custom {
        player_id: String,
        event: String,
        data: Value,
    },
}

/// Names of the events a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Error,
    Ready,
    LobbyCreated,
    LobbyJoined,
    LobbyLeft,
    LobbyKicked,
    LobbyClosed,
    LobbyPlayerJoined,
    LobbyPlayerLeft,
    LobbyOwnerChanged,
    LobbyList,
    PlayerJoined,
    PlayerLeft,
    RoomState,
    StateUpdate,
    Custom,
}

impl EventKind {
    /// The camelCase event name embedding code knows the event by.
    pub fn name(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Ready => "ready",
            Self::LobbyCreated => "lobbyCreated",
            Self::LobbyJoined => "lobbyJoined",
            Self::LobbyLeft => "lobbyLeft",
            Self::LobbyKicked => "lobbyKicked",
            Self::LobbyClosed => "lobbyClosed",
            Self::LobbyPlayerJoined => "lobbyPlayerJoined",
            Self::LobbyPlayerLeft => "lobbyPlayerLeft",
            Self::LobbyOwnerChanged => "lobbyOwnerChanged",
            Self::LobbyList => "lobbyList",
            Self::PlayerJoined => "playerJoined",
            Self::PlayerLeft => "playerLeft",
            Self::RoomState => "roomState",
            Self::StateUpdate => "stateUpdate",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl LobbyEvent {
    /// The kind this event is published under.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::Error { .. } => EventKind::Error,
            Self::Ready { .. } => EventKind::Ready,
            Self::LobbyCreated { .. } => EventKind::LobbyCreated,
            Self::LobbyJoined { .. } => EventKind::LobbyJoined,
            Self::LobbyLeft { .. } => EventKind::LobbyLeft,
            Self::LobbyKicked { .. } => EventKind::LobbyKicked,
            Self::LobbyClosed { .. } => EventKind::LobbyClosed,
            Self::LobbyPlayerJoined { .. } => EventKind::LobbyPlayerJoined,
            Self::LobbyPlayerLeft { .. } => EventKind::LobbyPlayerLeft,
            Self::LobbyOwnerChanged { .. } => EventKind::LobbyOwnerChanged,
            Self::LobbyList { .. } => EventKind::LobbyList,
            Self::PlayerJoined { .. } => EventKind::PlayerJoined,
            Self::PlayerLeft { .. } => EventKind::PlayerLeft,
            Self::RoomState { .. } => EventKind::RoomState,
            Self::StateUpdate { .. } => EventKind::StateUpdate,
            Self::Custom { .. } => EventKind::Custom,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&LobbyEvent) + Send + Sync + 'static>;

struct Subscription {
    id: SubscriptionId,
    /// `None` subscribes to every kind.
    kind: Option<EventKind>,
    handler: Handler,
}

/// Publish/subscribe hub for [`LobbyEvent`]s.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&LobbyEvent) + Send + Sync + 'static,
    {
        self.insert(Some(kind), Arc::new(handler))
    }

    /// Register `handler` for every event.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LobbyEvent) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(handler))
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|sub| sub.id != id);
        subs.len() != before
    }

    /// Deliver `event` to every matching handler, in subscription order.
    ///
    /// The subscriber list is snapshotted first, so handlers may subscribe or
    /// unsubscribe without deadlocking; such changes apply from the next
    /// publish.
    pub fn publish(&self, event: &LobbyEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|sub| sub.kind.is_none_or(|k| k == kind))
            .map(|sub| Arc::clone(&sub.handler))
            .collect();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(event = %kind, "event handler panicked; continuing with remaining handlers");
            }
        }
    }

    fn insert(&self, kind: Option<EventKind>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription { id, kind, handler });
        id
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("EventBus")
            .field("subscriptions", &count)
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
    use std::sync::Mutex as StdMutex;

    fn recorder() -> (Arc<StdMutex<Vec<String>>>, impl Fn(&str) -> Handler) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let log_for = Arc::clone(&log);
        let make = move |tag: &str| -> Handler {
            let log = Arc::clone(&log_for);
            let tag = tag.to_string();
            Arc::new(move |_ev: &LobbyEvent| log.lock().unwrap().push(tag.clone()))
        };
        (log, make)
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let first = make("first");
        let second = make("second");
        bus.subscribe(EventKind::Connected, move |e| first(e));
        bus.subscribe(EventKind::Connected, move |e| second(e));

        bus.publish(&LobbyEvent::Connected);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn handlers_only_see_their_kind() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let on_error = make("error");
        let on_any = make("any");
        bus.subscribe(EventKind::Error, move |e| on_error(e));
        bus.subscribe_all(move |e| on_any(e));

        bus.publish(&LobbyEvent::Connected);
        bus.publish(&LobbyEvent::Error {
            message: "x".into(),
        });
        assert_eq!(*log.lock().unwrap(), vec!["any", "error", "any"]);
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let after = make("after");
        bus.subscribe(EventKind::Ready, |_| panic!("handler bug"));
        bus.subscribe(EventKind::Ready, move |e| after(e));

        bus.publish(&LobbyEvent::Ready { multiplayer: false });
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let h = make("h");
        let id = bus.subscribe(EventKind::Connected, move |e| h(e));

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&LobbyEvent::Connected);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_publish() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<StdMutex<Option<SubscriptionId>>> = Arc::new(StdMutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let bus_in = Arc::clone(&bus);
        let slot_in = Arc::clone(&slot);
        let calls_in = Arc::clone(&calls);
        let id = bus.subscribe(EventKind::Connected, move |_| {
            calls_in.fetch_add(1, Ordering::Relaxed);
            if let Some(id) = *slot_in.lock().unwrap() {
                bus_in.unsubscribe(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        bus.publish(&LobbyEvent::Connected);
        bus.publish(&LobbyEvent::Connected);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn kind_names_are_camel_case() {
        assert_eq!(EventKind::LobbyKicked.name(), "lobbyKicked");
        assert_eq!(
            LobbyEvent::Ready { multiplayer: true }.kind().to_string(),
            "ready"
        );
    }
}
