//! Transport abstraction for the lobby protocol.
//!
//! The [`Transport`] trait is a bidirectional text channel: one call to
//! [`send`](Transport::send) writes one JSON frame, one call to
//! [`recv`](Transport::recv) yields one JSON frame. Framing is the
//! implementation's business (WebSocket frames, in-process channels, ...).
//!
//! Unlike a bare transport, the lobby client owns its socket lifecycle: it
//! opens and re-opens connections on demand. That is what [`Connector`] is
//! for. It turns a server URL into a freshly opened [`Transport`].
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use lobbylink_client::error::LobbyError;
//! use lobbylink_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), LobbyError> {
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), LobbyError> {
//!         unimplemented!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, LobbyError> {
//!         Ok(Box::new(MyTransport {}))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::LobbyError;

/// A bidirectional text message transport.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the transport
/// loop polls it inside `tokio::select!`. Channel-backed implementations are
/// naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::TransportSend`] if the frame could not be written.
    async fn send(&mut self, message: String) -> Result<(), LobbyError>;

    /// Receive the next JSON text frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed by the server
    async fn recv(&mut self) -> Option<Result<String, LobbyError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), LobbyError>;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send(&mut self, message: String) -> Result<(), LobbyError> {
        (**self).send(message).await
    }

    async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
        (**self).recv().await
    }

    async fn close(&mut self) -> Result<(), LobbyError> {
        (**self).close().await
    }
}

/// Opens a [`Transport`] to a server URL.
///
/// The connection manager calls this whenever it needs a socket and none is
/// open. The returned future resolving corresponds to the transport's "open"
/// event; the caller bounds it with the connect timeout.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Io`] (or another transport error) if the
    /// connection is refused or the URL is invalid.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, LobbyError>;
}
