//! Text transport beneath [`TransportMatchChannel`](crate::TransportMatchChannel).
//!
//! A [`Transport`] moves whole JSON lobby messages in both directions. Framing
//! is the implementation's business (WebSocket frames, length prefixes, an
//! in-process channel). Connecting is too: hand an already connected
//! transport to `TransportMatchChannel::start`.
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use lobby_sync_client::{LobbyError, Transport};
//! use tokio::sync::mpsc;
//!
//! /// In-process transport, e.g. for a fake match service.
//! struct Loopback {
//!     to_service: mpsc::UnboundedSender<String>,
//!     from_service: mpsc::UnboundedReceiver<String>,
//! }
//!
//! #[async_trait]
//! impl Transport for Loopback {
//!     async fn send(&mut self, message: String) -> Result<(), LobbyError> {
//!         self.to_service
//!             .send(message)
//!             .map_err(|e| LobbyError::TransportSend(e.to_string()))
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
//!         self.from_service.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), LobbyError> {
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::LobbyError;

/// A bidirectional channel of complete JSON text messages.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) runs inside `tokio::select!` and **must** be
/// cancel-safe: dropping an unfinished `recv` must not lose a message.
/// Wrapping an `mpsc::Receiver` or a `futures` stream satisfies this.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one message.
    ///
    /// # Errors
    ///
    /// [`LobbyError::TransportSend`] when the message cannot be written, or
    /// [`LobbyError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), LobbyError>;

    /// Receive the next message.
    ///
    /// `None` means the service closed the connection cleanly;
    /// `Some(Err(_))` is a transport failure. Both fault the match channel.
    async fn recv(&mut self) -> Option<Result<String, LobbyError>>;

    /// Close the connection. Resources are released even when the close
    /// handshake fails.
    ///
    /// # Errors
    ///
    /// Whatever the close handshake reports.
    async fn close(&mut self) -> Result<(), LobbyError>;
}
