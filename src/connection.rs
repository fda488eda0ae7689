//! Connection manager: the single socket and its lifecycle.
//!
//! [`ConnectionManager`] owns at most one live link at a time. A link is a
//! spawned transport loop plus the command channel feeding it. Every link
//! gets a generation number so that close reports from a superseded link
//! can be told apart from the current one.
//!
//! The loop multiplexes outbound frames and inbound frames with
//! `tokio::select!`. Inbound frames are handed to a [`LinkObserver`]
//! synchronously, one at a time, so they are fully processed in arrival
//! order. When the loop ends for any reason it reports exactly once through
//! [`LinkObserver::on_closed`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{LobbyError, Result};
use crate::protocol::ClientMessage;
use crate::transport::{Connector, Transport};

/// Why a link ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LinkClosed {
    /// Reason carried on the `disconnected` event.
    pub reason: Option<String>,
    /// Set when the link died from a transport failure.
    pub failure: Option<String>,
}

impl LinkClosed {
    pub fn requested() -> Self {
        Self {
            reason: Some("client shut down".into()),
            failure: None,
        }
    }

    /// The socket went away without a failure, e.g. the server closed it.
    pub fn lost() -> Self {
        Self {
            reason: None,
            failure: None,
        }
    }

    fn failed(what: &str, err: &LobbyError) -> Self {
        Self {
            reason: Some(format!("{what}: {err}")),
            failure: Some(err.to_string()),
        }
    }
}

/// Receives what a transport loop observes.
pub(crate) trait LinkObserver: Send + Sync + 'static {
    /// One inbound text frame, in arrival order.
    fn on_frame(&self, text: &str);

    /// The loop for `generation` has stopped.
    fn on_closed(&self, generation: u64, closed: LinkClosed);
}

enum Command {
    Send(String),
    Close,
}

struct Link {
    generation: u64,
    cmd_tx: mpsc::UnboundedSender<Command>,
    open: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Link {
    fn abort(self) {
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

pub(crate) struct ConnectionManager {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    shutdown_timeout: Duration,
    /// Serializes `open` so concurrent callers share one socket.
    open_lock: tokio::sync::Mutex<()>,
    link: Mutex<Option<Link>>,
    next_generation: AtomicU64,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        connect_timeout: Duration,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            connect_timeout,
            shutdown_timeout,
            open_lock: tokio::sync::Mutex::new(()),
            link: Mutex::new(None),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Returns `true` if a link exists and its loop is still running.
    pub fn is_open(&self) -> bool {
        self.lock_link()
            .as_ref()
            .is_some_and(|link| link.open.load(Ordering::Acquire))
    }

    /// Ensure a socket to `url` is open.
    ///
    /// Returns `Ok(true)` when a new socket was opened, `Ok(false)` when one
    /// was already open. Any stale link is torn down first, and its close is
    /// reported to `observer` if the loop has not reported it yet. If the
    /// connector does not finish within the connect timeout the half-open
    /// attempt is dropped and [`LobbyError::ConnectTimeout`] is returned.
    pub async fn open(&self, url: &str, observer: Weak<dyn LinkObserver>) -> Result<bool> {
        let _opening = self.open_lock.lock().await;
        if self.is_open() {
            return Ok(false);
        }
        let stale = self.lock_link().as_ref().map(|link| link.generation);
        if let Some(generation) = stale {
            debug!(generation, "discarding stale socket");
            // The loop has stopped but may not have reached `on_closed` yet.
            // Report on its behalf; `retire` keeps the cleanup to one run.
            if let Some(observer) = observer.upgrade() {
                observer.on_closed(generation, LinkClosed::lost());
            }
            if let Some(link) = self.lock_link().take() {
                link.abort();
            }
        }

        let transport =
            match tokio::time::timeout(self.connect_timeout, self.connector.connect(url)).await {
                Ok(Ok(transport)) => transport,
                Ok(Err(e)) => {
                    warn!(url = %url, "connection failed: {e}");
                    return Err(e);
                }
                Err(_) => {
                    warn!(url = %url, timeout = ?self.connect_timeout, "connection timed out");
                    return Err(LobbyError::ConnectTimeout);
                }
            };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        // Publish the link before the loop can run so its close report is
        // recognized as current.
        let mut guard = self.lock_link();
        *guard = Some(Link {
            generation,
            cmd_tx,
            open: Arc::clone(&open),
            task: None,
        });
        let task = tokio::spawn(transport_loop(
            transport,
            cmd_rx,
            observer,
            generation,
            open,
        ));
        if let Some(link) = guard.as_mut() {
            link.task = Some(task);
        }
        info!(url = %url, generation, "socket open");
        Ok(true)
    }

    /// Serialize and queue `msg` on the open socket.
    ///
    /// Returns `false` (and drops the frame) when no socket is open.
    pub fn send(&self, msg: &ClientMessage) -> bool {
        let guard = self.lock_link();
        let Some(link) = guard
            .as_ref()
            .filter(|link| link.open.load(Ordering::Acquire))
        else {
            debug!(
                "socket not open, dropping outbound {:?}",
                std::mem::discriminant(msg)
            );
            return false;
        };
        match serde_json::to_string(msg) {
            Ok(json) => link.cmd_tx.send(Command::Send(json)).is_ok(),
            Err(e) => {
                error!("failed to serialize ClientMessage: {e}");
                false
            }
        }
    }

    /// Forget the link for `generation`. Returns `false` if it is not the
    /// current link (already retired or superseded).
    pub fn retire(&self, generation: u64) -> bool {
        let mut guard = self.lock_link();
        if !guard
            .as_ref()
            .is_some_and(|link| link.generation == generation)
        {
            return false;
        }
        if let Some(link) = guard.take() {
            link.open.store(false, Ordering::Release);
        }
        true
    }

    /// Close the current socket gracefully.
    ///
    /// The loop gets the shutdown timeout to close the transport and report;
    /// after that it is aborted. Returns the generation that was closed, or
    /// `None` when nothing was open.
    pub async fn close(&self) -> Option<u64> {
        let (generation, cmd_tx, task) = {
            let mut guard = self.lock_link();
            let link = guard.as_mut()?;
            (link.generation, link.cmd_tx.clone(), link.task.take())
        };
        let _ = cmd_tx.send(Command::Close);

        if let Some(mut task) = task {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => warn!("transport loop terminated with join error: {join_err}"),
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }
        Some(generation)
    }

    /// Abort the current loop without a close handshake.
    pub fn abort(&self) {
        if let Some(link) = self.lock_link().take() {
            link.abort();
        }
    }

    fn lock_link(&self) -> std::sync::MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("open", &self.is_open())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Background loop driving one socket.
///
/// Exits when:
/// - a close is requested or the command channel closes
/// - the transport returns `None` (server closed the socket)
/// - a transport send or receive error occurs
/// - the observer is gone
async fn transport_loop(
    mut transport: Box<dyn Transport>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    observer: Weak<dyn LinkObserver>,
    generation: u64,
    open: Arc<AtomicBool>,
) {
    debug!(generation, "transport loop started");

    let closed = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Send(json)) => {
                        if let Err(e) = transport.send(json).await {
                            error!("transport send error: {e}");
                            break LinkClosed::failed("transport send error", &e);
                        }
                    }
                    Some(Command::Close) | None => {
                        debug!("close requested, shutting down transport loop");
                        let _ = transport.close().await;
                        break LinkClosed::requested();
                    }
                }
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        let Some(observer) = observer.upgrade() else {
                            debug!("client dropped, shutting down transport loop");
                            let _ = transport.close().await;
                            break LinkClosed::requested();
                        };
                        observer.on_frame(&text);
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        break LinkClosed::failed("transport receive error", &e);
                    }
                    None => {
                        debug!("transport closed by server");
                        break LinkClosed::lost();
                    }
                }
            }
        }
    };

    open.store(false, Ordering::Release);
    if let Some(observer) = observer.upgrade() {
        observer.on_closed(generation, closed);
    }
    debug!(generation, "transport loop exited");
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
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Channel-backed transport whose far end the test holds.
    struct ChannelTransport {
        inbound: mpsc::UnboundedReceiver<String>,
        outbound: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), LobbyError> {
            self.outbound
                .send(message)
                .map_err(|e| LobbyError::TransportSend(e.to_string()))
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, LobbyError>> {
            self.inbound.recv().await.map(Ok)
        }

        async fn close(&mut self) -> std::result::Result<(), LobbyError> {
            Ok(())
        }
    }

    struct FarEnd {
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    /// Hands out prepared transports in order, then refuses.
    struct QueuedConnector {
        transports: StdMutex<VecDeque<ChannelTransport>>,
    }

    fn queued(count: usize) -> (Arc<QueuedConnector>, Vec<FarEnd>) {
        let mut transports = VecDeque::new();
        let mut ends = Vec::new();
        for _ in 0..count {
            let (to_client, inbound) = mpsc::unbounded_channel();
            let (outbound, from_client) = mpsc::unbounded_channel();
            transports.push_back(ChannelTransport { inbound, outbound });
            ends.push(FarEnd {
                to_client,
                from_client,
            });
        }
        let connector = Arc::new(QueuedConnector {
            transports: StdMutex::new(transports),
        });
        (connector, ends)
    }

    fn one_shot() -> (Arc<QueuedConnector>, FarEnd) {
        let (connector, mut ends) = queued(1);
        (connector, ends.pop().unwrap())
    }

    #[async_trait]
    impl Connector for QueuedConnector {
        async fn connect(&self, _url: &str) -> std::result::Result<Box<dyn Transport>, LobbyError> {
            match self.transports.lock().unwrap().pop_front() {
                Some(t) => Ok(Box::new(t)),
                None => Err(LobbyError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                ))),
            }
        }
    }

    struct HangingConnector;

    #[async_trait]
    impl Connector for HangingConnector {
        async fn connect(&self, _url: &str) -> std::result::Result<Box<dyn Transport>, LobbyError> {
            std::future::pending().await
        }
    }

    #[derive(Default)]
    struct Recorder {
        frames: StdMutex<Vec<String>>,
        closed: StdMutex<Vec<(u64, LinkClosed)>>,
    }

    impl LinkObserver for Recorder {
        fn on_frame(&self, text: &str) {
            self.frames.lock().unwrap().push(text.to_string());
        }

        fn on_closed(&self, generation: u64, closed: LinkClosed) {
            self.closed.lock().unwrap().push((generation, closed));
        }
    }

    fn observe(recorder: &Arc<Recorder>) -> Weak<dyn LinkObserver> {
        let weak: Weak<Recorder> = Arc::downgrade(recorder);
        weak
    }

    fn manager(connector: Arc<dyn Connector>) -> ConnectionManager {
        ConnectionManager::new(
            connector,
            Duration::from_millis(50),
            Duration::from_millis(200),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn open_is_idempotent_while_socket_is_open() {
        let (connector, _far) = one_shot();
        let conn = manager(connector);
        let recorder = Arc::new(Recorder::default());
        let observer = observe(&recorder);

        assert!(conn.open("ws://test", observer.clone()).await.unwrap());
        // A second connect would be refused, so this must reuse the link.
        assert!(!conn.open("ws://test", observer).await.unwrap());
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn open_times_out_and_stays_closed() {
        let conn = manager(Arc::new(HangingConnector));
        let recorder = Arc::new(Recorder::default());
        let observer = observe(&recorder);

        let err = conn.open("ws://test", observer).await.unwrap_err();
        assert!(matches!(err, LobbyError::ConnectTimeout));
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn frames_flow_both_ways_in_order() {
        let (connector, mut far) = one_shot();
        let conn = manager(connector);
        let recorder = Arc::new(Recorder::default());
        let observer = observe(&recorder);
        conn.open("ws://test", observer).await.unwrap();

        assert!(conn.send(&ClientMessage::LobbyLeave));
        assert_eq!(
            far.from_client.recv().await.unwrap(),
            r#"{"type":"lobby_leave"}"#
        );

        for n in 0..5 {
            far.to_client.send(format!("frame-{n}")).unwrap();
        }
        settle().await;
        let frames = recorder.frames.lock().unwrap().clone();
        assert_eq!(
            frames,
            (0..5).map(|n| format!("frame-{n}")).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn server_close_reports_once_and_drops_sends() {
        let (connector, far) = one_shot();
        let conn = manager(connector);
        let recorder = Arc::new(Recorder::default());
        let observer = observe(&recorder);
        conn.open("ws://test", observer).await.unwrap();

        drop(far);
        settle().await;

        let closed = recorder.closed.lock().unwrap().clone();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].1.reason, None);
        assert!(!conn.is_open());
        assert!(!conn.send(&ClientMessage::LobbyClose));
    }

    #[tokio::test]
    async fn close_reports_requested_shutdown() {
        let (connector, _far) = one_shot();
        let conn = manager(connector);
        let recorder = Arc::new(Recorder::default());
        let observer = observe(&recorder);
        conn.open("ws://test", observer).await.unwrap();

        let generation = conn.close().await.unwrap();
        let closed = recorder.closed.lock().unwrap().clone();
        assert_eq!(closed, vec![(generation, LinkClosed::requested())]);
        assert!(conn.retire(generation));
        assert!(!conn.retire(generation));
        assert!(conn.close().await.is_none());
    }

    #[tokio::test]
    async fn reopen_reports_stale_link_whose_loop_has_not_reported() {
        let (connector, _ends) = queued(2);
        let conn = manager(connector);
        let recorder = Arc::new(Recorder::default());
        let observer = observe(&recorder);
        assert!(conn.open("ws://test", observer.clone()).await.unwrap());
        let first = conn.lock_link().as_ref().unwrap().generation;

        // The loop has marked itself closed but not yet called `on_closed`.
        conn.lock_link()
            .as_ref()
            .unwrap()
            .open
            .store(false, Ordering::Release);

        assert!(conn.open("ws://test", observer).await.unwrap());
        settle().await;

        let closed = recorder.closed.lock().unwrap().clone();
        assert_eq!(closed, vec![(first, LinkClosed::lost())]);
        assert!(conn.is_open());
        assert!(!conn.retire(first));
        assert_ne!(conn.lock_link().as_ref().unwrap().generation, first);
    }
}
