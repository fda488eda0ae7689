//! Outstanding handshake records.
//!
//! Create, join, and list each park a record here before their request frame
//! is sent. The dispatcher settles records as responses arrive; the waiting
//! operation removes its own record if its deadline passes first.
//!
//! The wire protocol carries no request id, so responses are matched FIFO per
//! [`RequestKind`]. A server `error` settles the oldest create or join.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::error::{LobbyError, Result};
use crate::protocol::{LobbyInfo, LobbySummary, RemotePlayer};

/// Result of a successful join handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct LobbySnapshot {
    pub lobby: LobbyInfo,
    pub players: Vec<RemotePlayer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Create,
    Join,
    List,
}

pub(crate) type RequestId = u64;

enum Resolver {
    Create(oneshot::Sender<Result<LobbyInfo>>),
    Join(oneshot::Sender<Result<LobbySnapshot>>),
    List(oneshot::Sender<Vec<LobbySummary>>),
}

impl Resolver {
    fn kind(&self) -> RequestKind {
        match self {
            Self::Create(_) => RequestKind::Create,
            Self::Join(_) => RequestKind::Join,
            Self::List(_) => RequestKind::List,
        }
    }

    /// Settle as failed. Lists never fail; they settle empty.
    fn fail(self, err: impl FnOnce() -> LobbyError) {
        // A dropped receiver means the waiter already gave up.
        match self {
            Self::Create(tx) => {
                let _ = tx.send(Err(err()));
            }
            Self::Join(tx) => {
                let _ = tx.send(Err(err()));
            }
            Self::List(tx) => {
                let _ = tx.send(Vec::new());
            }
        }
    }
}

struct PendingRequest {
    id: RequestId,
    resolver: Resolver,
}

/// FIFO table of outstanding handshakes.
#[derive(Default)]
pub(crate) struct PendingRequests {
    next_id: RequestId,
    requests: VecDeque<PendingRequest>,
}

impl PendingRequests {
    pub fn register_create(&mut self) -> (RequestId, oneshot::Receiver<Result<LobbyInfo>>) {
        let (tx, rx) = oneshot::channel();
        (self.push(Resolver::Create(tx)), rx)
    }

    pub fn register_join(&mut self) -> (RequestId, oneshot::Receiver<Result<LobbySnapshot>>) {
        let (tx, rx) = oneshot::channel();
        (self.push(Resolver::Join(tx)), rx)
    }

    pub fn register_list(&mut self) -> (RequestId, oneshot::Receiver<Vec<LobbySummary>>) {
        let (tx, rx) = oneshot::channel();
        (self.push(Resolver::List(tx)), rx)
    }

    /// Drop a record whose waiter stopped waiting. Returns `true` if it was
    /// still outstanding.
    pub fn cancel(&mut self, id: RequestId) -> bool {
        let before = self.requests.len();
        self.requests.retain(|r| r.id != id);
        self.requests.len() != before
    }

    pub fn resolve_create(&mut self, lobby: LobbyInfo) -> bool {
        match self.take_oldest(|k| k == RequestKind::Create) {
            Some(Resolver::Create(tx)) => {
                let _ = tx.send(Ok(lobby));
                true
            }
            _ => false,
        }
    }

    pub fn resolve_join(&mut self, snapshot: LobbySnapshot) -> bool {
        match self.take_oldest(|k| k == RequestKind::Join) {
            Some(Resolver::Join(tx)) => {
                let _ = tx.send(Ok(snapshot));
                true
            }
            _ => false,
        }
    }

    pub fn resolve_list(&mut self, lobbies: Vec<LobbySummary>) -> bool {
        match self.take_oldest(|k| k == RequestKind::List) {
            Some(Resolver::List(tx)) => {
                let _ = tx.send(lobbies);
                true
            }
            _ => false,
        }
    }

    /// Reject the oldest create or join with a server error.
    pub fn reject_handshake(&mut self, message: &str) -> bool {
        match self.take_oldest(|k| matches!(k, RequestKind::Create | RequestKind::Join)) {
            Some(resolver) => {
                resolver.fail(|| LobbyError::Server {
                    message: message.to_string(),
                });
                true
            }
            None => false,
        }
    }

    /// Settle everything after the connection dropped.
    pub fn fail_all(&mut self) {
        for request in self.requests.drain(..) {
            request.resolver.fail(|| LobbyError::Disconnected);
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    fn push(&mut self, resolver: Resolver) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        self.requests.push_back(PendingRequest { id, resolver });
        id
    }

    fn take_oldest(&mut self, wanted: impl Fn(RequestKind) -> bool) -> Option<Resolver> {
        let idx = self
            .requests
            .iter()
            .position(|r| wanted(r.resolver.kind()))?;
        self.requests.remove(idx).map(|r| r.resolver)
    }
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("outstanding", &self.len())
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

    fn lobby(id: &str) -> LobbyInfo {
        LobbyInfo::new(id, "Arena", "p_me", 4)
    }

    #[tokio::test]
    async fn responses_settle_oldest_of_their_kind() {
        let mut pending = PendingRequests::default();
        let (_, first) = pending.register_create();
        let (_, join) = pending.register_join();
        let (_, second) = pending.register_create();

        assert!(pending.resolve_create(lobby("L1")));
        assert!(pending.resolve_create(lobby("L2")));
        assert!(!pending.resolve_create(lobby("L3")));

        assert_eq!(first.await.unwrap().unwrap().lobby_id, "L1");
        assert_eq!(second.await.unwrap().unwrap().lobby_id, "L2");
        assert_eq!(pending.len(), 1);
        drop(join);
    }

    #[tokio::test]
    async fn server_error_rejects_oldest_handshake_only() {
        let mut pending = PendingRequests::default();
        let (_, list) = pending.register_list();
        let (_, join) = pending.register_join();
        let (_, create) = pending.register_create();

        assert!(pending.reject_handshake("lobby not found"));
        let err = join.await.unwrap().unwrap_err();
        assert!(matches!(err, LobbyError::Server { ref message } if message == "lobby not found"));
        assert_eq!(pending.len(), 2);

        pending.fail_all();
        assert!(matches!(
            create.await.unwrap(),
            Err(LobbyError::Disconnected)
        ));
        assert!(list.await.unwrap().is_empty());
    }

    #[test]
    fn cancel_removes_only_that_record() {
        let mut pending = PendingRequests::default();
        let (a, _ra) = pending.register_list();
        let (_b, _rb) = pending.register_list();
        assert!(pending.cancel(a));
        assert!(!pending.cancel(a));
        assert_eq!(pending.len(), 1);
    }
}
