//! Boundary contract for the remote match service.
//!
//! [`MatchChannel`] is what the lobby core needs from the remote side:
//! request/response calls for creating, joining and leaving matches,
//! lobby subscribe/unsubscribe, and a push path that delivers
//! [`MatchPush`] events to an attached [`PushSink`].
//!
//! [`TransportMatchChannel`](crate::transport_channel::TransportMatchChannel)
//! implements it over any text [`Transport`](crate::transport::Transport);
//! tests implement it directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channel::ServiceChannel;
use crate::error::Result;
use crate::roster::{LobbyMember, RosterEvent};
use crate::session::UserId;
use crate::subscription::PushSink;

/// Unique identifier for matches.
pub type MatchId = i64;

/// Response to a create or join request: the match and its initial roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub match_id: MatchId,
    /// Join code other players use to enter the match.
    pub code: String,
    /// Members already in the lobby, in lobby order.
    #[serde(default)]
    pub members: Vec<LobbyMember>,
}

/// A pushed lobby event tagged with the match it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPush {
    pub match_id: MatchId,
    pub event: RosterEvent,
}

impl MatchPush {
    pub fn new(match_id: MatchId, event: RosterEvent) -> Self {
        Self { match_id, event }
    }
}

/// Remote match service channel.
///
/// Every call may fail with [`LobbyError::ServiceFault`](crate::LobbyError::ServiceFault),
/// [`LobbyError::Timeout`](crate::LobbyError::Timeout) or
/// [`LobbyError::CommunicationFailure`](crate::LobbyError::CommunicationFailure).
/// Callers bound each call with their own request timeout as well.
#[async_trait]
pub trait MatchChannel: ServiceChannel {
    /// Create a new match hosted by `profile_id`.
    async fn create_match(&mut self, profile_id: UserId) -> Result<MatchSnapshot>;

    /// Join the match identified by `code`.
    async fn join_match(&mut self, user_id: UserId, code: &str) -> Result<MatchSnapshot>;

    /// Start receiving pushes for `match_id`.
    async fn subscribe(&mut self, match_id: MatchId) -> Result<()>;

    /// Stop receiving pushes for `match_id`.
    async fn unsubscribe(&mut self, match_id: MatchId) -> Result<()>;

    /// Remove `user_id` from `match_id`. Returns the service's success flag.
    async fn leave_match(&mut self, match_id: MatchId, user_id: UserId) -> Result<bool>;

    /// Route future pushes to `sink`, replacing any previous sink.
    fn attach_push_sink(&mut self, sink: PushSink);
}
