//! WebSocket [`Transport`] backed by `tokio-tungstenite`.
//!
//! Lobby protocol messages travel as text frames. `ws://` and `wss://` URLs
//! are both accepted; TLS is handled by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! Only available with the `transport-websocket` feature (on by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), lobby_sync_client::LobbyError> {
//! use std::time::Duration;
//! use lobby_sync_client::{LobbyConfig, TransportMatchChannel, WebSocketTransport};
//!
//! let config = LobbyConfig::default();
//! let transport =
//!     WebSocketTransport::connect_with_timeout("ws://localhost:8080/lobby", Duration::from_secs(5))
//!         .await?;
//! let channel = TransportMatchChannel::start(transport, &config);
//! # drop(channel);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::error::LobbyError;
use crate::transport::Transport;

/// The WebSocket stream type produced by [`WebSocketTransport::connect`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// What a received frame means for the lobby protocol.
enum Inbound {
    Text(String),
    Closed,
    Skip,
}

fn classify(msg: Message) -> Inbound {
    match msg {
        Message::Text(text) => Inbound::Text(text.to_string()),
        Message::Close(frame) => {
            debug!(?frame, "received WebSocket close frame");
            Inbound::Closed
        }
        // tungstenite answers pings itself.
        Message::Ping(_) | Message::Pong(_) => Inbound::Skip,
        Message::Binary(bytes) => {
            warn!(len = bytes.len(), "skipping binary frame; lobby protocol is text-only");
            Inbound::Skip
        }
        Message::Frame(_) => Inbound::Skip,
    }
}

/// A [`Transport`] over one WebSocket connection.
///
/// [`recv`](Transport::recv) is cancel-safe: the underlying stream buffers
/// frames, so dropping a pending `recv` loses nothing.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to the lobby service at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Io`] if the URL is invalid or the handshake
    /// fails. An underlying I/O error keeps its
    /// [`ErrorKind`](std::io::ErrorKind); anything else maps to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, LobbyError> {
        debug!(url = %url, "connecting to lobby service");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            LobbyError::Io(std::io::Error::new(kind, e))
        })?;

        info!(url = %url, "lobby service connection established");
        Ok(Self::from_stream(stream))
    }

    /// [`connect`](Self::connect), failing with [`LobbyError::Timeout`] if
    /// the handshake does not finish within `timeout`.
    ///
    /// # Errors
    ///
    /// [`LobbyError::Timeout`], or anything [`connect`](Self::connect) returns.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, LobbyError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| LobbyError::Timeout)?
    }

    /// Wrap a stream set up by the caller (custom TLS, headers, proxies).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), LobbyError> {
        if self.closed {
            return Err(LobbyError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| LobbyError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(LobbyError::TransportReceive(e.to_string()))),
            };
            match classify(msg) {
                Inbound::Text(text) => return Some(Ok(text)),
                Inbound::Closed => return None,
                Inbound::Skip => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), LobbyError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| LobbyError::TransportSend(e.to_string()))
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
    use tokio::net::TcpListener;

    /// Accept one WebSocket connection on a local port and hand it to
    /// `handler`. Returns the URL to connect to.
    async fn serve_once<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });
        format!("ws://{addr}")
    }

    const PUSH: &str = r#"{"type":"GameStarted","data":{"match_id":42}}"#;

    #[test]
    fn transport_is_send_and_debug() {
        fn assert_traits<T: Send + std::fmt::Debug>() {}
        assert_traits::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_rejects_invalid_url() {
        let err = WebSocketTransport::connect("lobby-service").await.unwrap_err();
        assert!(matches!(err, LobbyError::Io(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Accepts TCP but never answers the WebSocket handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let err = WebSocketTransport::connect_with_timeout(&url, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, LobbyError::Timeout));
        drop(listener);
    }

    #[tokio::test]
    async fn recv_yields_text_then_none_on_close() {
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Text(PUSH.into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), PUSH);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Text(PUSH.into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), PUSH);
    }

    #[tokio::test]
    async fn send_reaches_server() {
        let url = serve_once(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.send(PUSH.to_string()).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), PUSH);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_send() {
        let url = serve_once(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} }).await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send(PUSH.to_string()).await.unwrap_err();
        assert!(matches!(err, LobbyError::TransportClosed));
    }
}
