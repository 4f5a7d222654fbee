//! # Lobby Sync Client
//!
//! Client-side lobby synchronization for multiplayer matches.
//!
//! The crate keeps a local roster of a match lobby consistent with pushed
//! server events, owns the subscribe → listen → unsubscribe lifecycle of the
//! lobby, and gates every match operation on a signed-in session.
//!
//! ## Features
//!
//! - **Event-projected roster** — [`LobbyRoster::apply`] folds idempotent
//!   join/leave/ready events into an ordered member list
//! - **Single-writer dispatch** — pushes from any task are funnelled through a
//!   [`CallbackDispatcher`]; consumers read a [`RosterView`]
//! - **Safe teardown** — [`close_safely`] always leaves a channel `Closed`,
//!   aborting when a graceful close fails
//! - **Transport-agnostic** — implement [`MatchChannel`] directly, or
//!   implement [`Transport`] and use [`TransportMatchChannel`]
//! - **WebSocket built-in** — default `transport-websocket` feature provides
//!   `WebSocketTransport`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lobby_sync_client::{
//!     LobbyClient, LobbyConfig, SessionState, TransportMatchChannel, WebSocketTransport,
//! };
//!
//! let session = SessionState::new();
//! session.sign_in(7, Some("Ana"), Some("ana@example.com"), token)?;
//!
//! let config = LobbyConfig::default();
//! let transport = WebSocketTransport::connect("ws://localhost:8080/lobby").await?;
//! let channel = TransportMatchChannel::start(transport, &config);
//!
//! let client = LobbyClient::new(session, config);
//! let mut lobby = client.join_match(channel, "ABC123").await?;
//! while let Some(change) = lobby.roster.next_change().await {
//!     println!("{change:?}: {:?}", lobby.roster.members());
//! }
//! lobby.close().await;
//! ```

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod error_codes;
pub mod lobby;
pub mod match_channel;
pub mod protocol;
pub mod roster;
pub mod session;
pub mod subscription;
pub mod transport;
pub mod transport_channel;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use channel::{close_safely, ChannelState, ServiceChannel};
pub use config::LobbyConfig;
pub use dispatcher::{CallbackDispatcher, DispatchHandle, RosterView};
pub use error::{LobbyError, Result};
pub use error_codes::FaultCode;
pub use lobby::{Lobby, LobbyClient};
pub use match_channel::{MatchChannel, MatchId, MatchPush, MatchSnapshot};
pub use protocol::{ClientMessage, ServerMessage};
pub use roster::{LobbyMember, LobbyRoster, RosterChange, RosterEvent};
pub use session::{SessionIdentity, SessionState, UserId};
pub use subscription::{LobbySubscription, PushSink, SubscriptionState};
pub use transport::Transport;
pub use transport_channel::TransportMatchChannel;

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
