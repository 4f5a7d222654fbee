//! Wire protocol for the text-transport match channel.
//!
//! Messages are adjacently tagged JSON objects:
//! `{"type": "Variant", "data": {...}}`. Every client request carries a
//! `request_id`; the server echoes it on the matching reply or `Fault`.
//! Pushes carry the `match_id` they belong to instead.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error_codes::FaultCode;
use crate::match_channel::{MatchId, MatchPush, MatchSnapshot};
use crate::roster::{LobbyMember, RosterEvent};
use crate::session::UserId;

/// Correlates a request with its reply.
pub type RequestId = Uuid;

/// Requests sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    /// Create a match hosted by `profile_id`.
    CreateMatch {
        request_id: RequestId,
        profile_id: UserId,
    },
    /// Join a match by its join code.
    JoinMatch {
        request_id: RequestId,
        user_id: UserId,
        match_code: String,
    },
    /// Start receiving lobby pushes for a match.
    SubscribeLobby {
        request_id: RequestId,
        match_id: MatchId,
    },
    /// Stop receiving lobby pushes for a match.
    UnsubscribeLobby {
        request_id: RequestId,
        match_id: MatchId,
    },
    /// Remove a user from a match.
    LeaveMatch {
        request_id: RequestId,
        match_id: MatchId,
        user_id: UserId,
    },
}

impl ClientMessage {
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::CreateMatch { request_id, .. }
            | Self::JoinMatch { request_id, .. }
            | Self::SubscribeLobby { request_id, .. }
            | Self::UnsubscribeLobby { request_id, .. }
            | Self::LeaveMatch { request_id, .. } => *request_id,
        }
    }

    /// Variant name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateMatch { .. } => "CreateMatch",
            Self::JoinMatch { .. } => "JoinMatch",
            Self::SubscribeLobby { .. } => "SubscribeLobby",
            Self::UnsubscribeLobby { .. } => "UnsubscribeLobby",
            Self::LeaveMatch { .. } => "LeaveMatch",
        }
    }
}

/// Replies and pushes sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// Reply to `CreateMatch`.
    MatchCreated {
        request_id: RequestId,
        snapshot: MatchSnapshot,
    },
    /// Reply to `JoinMatch`.
    MatchJoined {
        request_id: RequestId,
        snapshot: MatchSnapshot,
    },
    /// Reply to `SubscribeLobby`.
    LobbySubscribed { request_id: RequestId },
    /// Reply to `UnsubscribeLobby`.
    LobbyUnsubscribed { request_id: RequestId },
    /// Reply to `LeaveMatch`.
    MatchLeft { request_id: RequestId, success: bool },
    /// A request failed. `request_id` is absent for connection-level faults.
    Fault {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        code: FaultCode,
        message: String,
    },
    /// A player entered the lobby.
    PlayerJoined {
        match_id: MatchId,
        player: LobbyMember,
    },
    /// A player left the lobby.
    PlayerLeft { match_id: MatchId, user_id: UserId },
    /// A player's ready flag changed.
    ReadyChanged {
        match_id: MatchId,
        user_id: UserId,
        is_ready: bool,
    },
    /// The host started the game.
    GameStarted { match_id: MatchId },
}

impl ServerMessage {
    /// The request this message answers, if it is a reply.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::MatchCreated { request_id, .. }
            | Self::MatchJoined { request_id, .. }
            | Self::LobbySubscribed { request_id }
            | Self::LobbyUnsubscribed { request_id }
            | Self::MatchLeft { request_id, .. } => Some(*request_id),
            Self::Fault { request_id, .. } => *request_id,
            Self::PlayerJoined { .. }
            | Self::PlayerLeft { .. }
            | Self::ReadyChanged { .. }
            | Self::GameStarted { .. } => None,
        }
    }

    /// Variant name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MatchCreated { .. } => "MatchCreated",
            Self::MatchJoined { .. } => "MatchJoined",
            Self::LobbySubscribed { .. } => "LobbySubscribed",
            Self::LobbyUnsubscribed { .. } => "LobbyUnsubscribed",
            Self::MatchLeft { .. } => "MatchLeft",
            Self::Fault { .. } => "Fault",
            Self::PlayerJoined { .. } => "PlayerJoined",
            Self::PlayerLeft { .. } => "PlayerLeft",
            Self::ReadyChanged { .. } => "ReadyChanged",
            Self::GameStarted { .. } => "GameStarted",
        }
    }

    /// Convert a push message into a [`MatchPush`]. Replies yield `None`.
    pub fn into_push(self) -> Option<MatchPush> {
        let push = match self {
            Self::PlayerJoined { match_id, player } => {
                MatchPush::new(match_id, RosterEvent::PlayerJoined(player))
            }
            Self::PlayerLeft { match_id, user_id } => {
                MatchPush::new(match_id, RosterEvent::PlayerLeft { user_id })
            }
            Self::ReadyChanged {
                match_id,
                user_id,
                is_ready,
            } => MatchPush::new(match_id, RosterEvent::ReadyChanged { user_id, is_ready }),
            Self::GameStarted { match_id } => MatchPush::new(match_id, RosterEvent::GameStarted),
            _ => return None,
        };
        Some(push)
    }
}
