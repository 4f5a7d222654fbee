//! # Loopback Lobby Demo
//!
//! Runs the full lobby flow against an in-process fake match service:
//!
//! 1. Sign in and join a match by code
//! 2. Seed the roster from the join response and subscribe to the lobby
//! 3. Follow pushed join/ready events until the host starts the game
//! 4. Close the lobby (unsubscribe, then close the channel)
//!
//! ## Running
//!
//! ```sh
//! RUST_LOG=debug cargo run --example loopback_lobby
//! ```

use async_trait::async_trait;
use lobby_sync_client::{
    ClientMessage, LobbyClient, LobbyConfig, LobbyError, LobbyMember, MatchSnapshot,
    RosterChange, ServerMessage, SessionState, Transport, TransportMatchChannel,
};
use tokio::sync::mpsc;

// ── Loopback transport ──────────────────────────────────────────────

/// Client half of an in-process connection.
struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), LobbyError> {
        self.tx
            .send(message)
            .map_err(|e| LobbyError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), LobbyError> {
        Ok(())
    }
}

// ── Fake match service ──────────────────────────────────────────────

/// Answer requests until the client hangs up. After the subscribe reply,
/// play a short lobby script.
async fn fake_service(
    mut requests: mpsc::UnboundedReceiver<String>,
    replies: mpsc::UnboundedSender<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let snapshot = MatchSnapshot {
        match_id: 42,
        code: "ABC123".into(),
        members: vec![
            LobbyMember::new(1, "Host").with_host(true),
            LobbyMember::new(7, "Ana"),
        ],
    };
    let send = |msg: ServerMessage| -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        replies.send(serde_json::to_string(&msg)?)?;
        Ok(())
    };

    while let Some(text) = requests.recv().await {
        let request: ClientMessage = serde_json::from_str(&text)?;
        tracing::info!("service received {}", request.kind());
        let request_id = request.request_id();

        match request {
            ClientMessage::JoinMatch { .. } => send(ServerMessage::MatchJoined {
                request_id,
                snapshot: snapshot.clone(),
            })?,
            ClientMessage::CreateMatch { .. } => send(ServerMessage::MatchCreated {
                request_id,
                snapshot: snapshot.clone(),
            })?,
            ClientMessage::SubscribeLobby { match_id, .. } => {
                send(ServerMessage::LobbySubscribed { request_id })?;
                // Our own join echoes back; the roster already has it.
                send(ServerMessage::PlayerJoined {
                    match_id,
                    player: LobbyMember::new(7, "Ana"),
                })?;
                send(ServerMessage::PlayerJoined {
                    match_id,
                    player: LobbyMember::new(8, "Bo"),
                })?;
                send(ServerMessage::ReadyChanged {
                    match_id,
                    user_id: 8,
                    is_ready: true,
                })?;
                send(ServerMessage::ReadyChanged {
                    match_id,
                    user_id: 7,
                    is_ready: true,
                })?;
                send(ServerMessage::GameStarted { match_id })?;
            }
            ClientMessage::UnsubscribeLobby { .. } => {
                send(ServerMessage::LobbyUnsubscribed { request_id })?
            }
            ClientMessage::LeaveMatch { .. } => send(ServerMessage::MatchLeft {
                request_id,
                success: true,
            })?,
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Wiring ──────────────────────────────────────────────────────
    let (client_tx, service_rx) = mpsc::unbounded_channel();
    let (service_tx, client_rx) = mpsc::unbounded_channel();
    let service = tokio::spawn(fake_service(service_rx, service_tx));

    let config = LobbyConfig::default();
    let transport = LoopbackTransport {
        tx: client_tx,
        rx: client_rx,
    };
    let channel = TransportMatchChannel::start(transport, &config);

    // ── Session ─────────────────────────────────────────────────────
    let session = SessionState::new();
    session.sign_in(7, Some("Ana"), Some("ana@example.com"), "demo-token")?;
    let client = LobbyClient::new(session, config);

    // ── Lobby ───────────────────────────────────────────────────────
    let mut lobby = client.join_match(channel, " ABC123 ").await?;
    tracing::info!(
        "joined match {} ({}) with {} player(s)",
        lobby.match_id(),
        lobby.code,
        lobby.roster.len()
    );

    while let Some(change) = lobby.roster.next_change().await {
        match change {
            RosterChange::Appended { member, .. } => {
                tracing::info!("{} joined", member.display_name);
            }
            RosterChange::Removed { member, .. } => {
                tracing::info!("{} left", member.display_name);
            }
            RosterChange::Updated { member, .. } => {
                let who = if lobby.is_local_player(member.user_id) {
                    "you"
                } else {
                    member.display_name.as_str()
                };
                tracing::info!("{who}: ready={}", member.is_ready);
            }
            RosterChange::GameStarted => {
                tracing::info!("game started");
                break;
            }
        }
    }

    for member in lobby.roster.members() {
        tracing::info!(
            "  {:<6} host={:<5} ready={}",
            member.display_name,
            member.is_host,
            member.is_ready
        );
    }

    // ── Shutdown ────────────────────────────────────────────────────
    lobby.close().await;
    drop(lobby);
    if let Err(e) = service.await? {
        tracing::warn!("fake service stopped: {e}");
    }
    tracing::info!("done");
    Ok(())
}
