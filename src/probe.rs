//! Server reachability probe.
//!
//! Opens a socket to a candidate URL, closes it again, and reports whether
//! that worked and how long the open took. Shells use this to pick a server
//! before starting a session.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::transport::Connector;

/// Result of [`probe_server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub online: bool,
    /// Time until the socket opened. `None` when offline.
    pub latency: Option<Duration>,
}

impl ServerStatus {
    pub const OFFLINE: Self = Self {
        online: false,
        latency: None,
    };
}

/// Probe `url` with an open/close round trip bounded by `timeout`.
///
/// Never fails: refusal and timeout both report offline.
pub async fn probe_server(connector: &dyn Connector, url: &str, timeout: Duration) -> ServerStatus {
    let started = Instant::now();
    match tokio::time::timeout(timeout, connector.connect(url)).await {
        Ok(Ok(mut transport)) => {
            let latency = started.elapsed();
            if let Err(e) = transport.close().await {
                debug!(url = %url, "probe close failed: {e}");
            }
            debug!(url = %url, ?latency, "server online");
            ServerStatus {
                online: true,
                latency: Some(latency),
            }
        }
        Ok(Err(e)) => {
            debug!(url = %url, "server offline: {e}");
            ServerStatus::OFFLINE
        }
        Err(_) => {
            debug!(url = %url, ?timeout, "server probe timed out");
            ServerStatus::OFFLINE
        }
    }
}
