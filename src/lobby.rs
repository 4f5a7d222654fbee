//! Session-gated entry point for creating, joining and opening lobbies.
//!
//! [`LobbyClient`] is the identity consumer of the core: every operation
//! checks the injected [`SessionState`] before touching the remote channel,
//! installs the create/join snapshot as the initial roster, and only then
//! opens the lobby subscription. That ordering guarantees the snapshot is in
//! place before any push for the match is processed.
//!
//! # Example
//!
//! ```rust,ignore
//! let session = SessionState::new();
//! session.sign_in(7, Some("Ana"), Some("ana@example.com"), token)?;
//!
//! let client = LobbyClient::new(session.clone(), LobbyConfig::default());
//! let mut lobby = client.join_match(channel, "ABC123").await?;
//!
//! while let Some(change) = lobby.roster.next_change().await {
//!     render(&lobby.roster.members());
//! }
//! lobby.close().await;
//! ```

use tracing::{info, warn};

use crate::channel::{close_safely, ServiceChannel};
use crate::config::LobbyConfig;
use crate::dispatcher::RosterView;
use crate::error::{LobbyError, Result};
use crate::match_channel::{MatchChannel, MatchId, MatchSnapshot};
use crate::roster::LobbyRoster;
use crate::session::{SessionState, UserId};
use crate::subscription::{LobbySubscription, SubscriptionState};

/// An open match lobby: its subscription, join code and roster view.
pub struct Lobby<C: MatchChannel> {
    /// Join code of the match.
    pub code: String,
    /// Subscription that owns the channel and the roster dispatcher.
    pub subscription: LobbySubscription<C>,
    /// Read-only view of the roster.
    pub roster: RosterView,
    session: SessionState,
}

impl<C: MatchChannel> Lobby<C> {
    pub fn match_id(&self) -> MatchId {
        self.subscription.match_id()
    }

    pub fn state(&self) -> SubscriptionState {
        self.subscription.state()
    }

    /// Returns `true` if the signed-in user hosts this lobby.
    pub fn is_current_user_host(&self) -> bool {
        self.roster.is_host(self.session.user_id())
    }

    /// Returns `true` if `user_id` is the signed-in user.
    pub fn is_local_player(&self, user_id: UserId) -> bool {
        self.session.is_local_user(user_id)
    }

    /// Leave the match. See [`LobbySubscription::leave`].
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`LobbySubscription::leave`].
    pub async fn leave(&mut self) -> Result<bool> {
        self.subscription.leave().await
    }

    /// Close the lobby subscription. See [`LobbySubscription::close`].
    pub async fn close(&mut self) {
        self.subscription.close().await;
    }
}

impl<C: MatchChannel> std::fmt::Debug for Lobby<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lobby")
            .field("code", &self.code)
            .field("subscription", &self.subscription)
            .field("members", &self.roster.len())
            .finish()
    }
}

/// Creates and joins matches on behalf of the signed-in user.
#[derive(Debug, Clone)]
pub struct LobbyClient {
    session: SessionState,
    config: LobbyConfig,
}

impl LobbyClient {
    pub fn new(session: SessionState, config: LobbyConfig) -> Self {
        Self { session, config }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    /// Create a match hosted by the signed-in user and open its lobby.
    ///
    /// # Errors
    ///
    /// - [`LobbyError::NotAuthenticated`] when signed out; `channel` is
    ///   released without any request.
    /// - Errors from the create request or from opening the subscription.
    ///   The channel is always released before the error is returned.
    pub async fn create_match<C: MatchChannel>(&self, mut channel: C) -> Result<Lobby<C>> {
        let user_id = match self.require_authenticated() {
            Ok(user_id) => user_id,
            Err(err) => {
                release(&mut channel, &err, &self.config).await;
                return Err(err);
            }
        };

        info!(user_id, "creating match");
        let result = match tokio::time::timeout(
            self.config.request_timeout,
            channel.create_match(user_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(LobbyError::Timeout),
        };

        match result {
            Ok(snapshot) => self.open_lobby(channel, snapshot).await,
            Err(err) => {
                warn!(user_id, error = %err, "create match failed");
                release(&mut channel, &err, &self.config).await;
                Err(err)
            }
        }
    }

    /// Join the match identified by `code` and open its lobby.
    ///
    /// Surrounding whitespace in `code` is ignored.
    ///
    /// # Errors
    ///
    /// - [`LobbyError::NotAuthenticated`] when signed out, or
    ///   [`LobbyError::InvalidArgument`] for an empty code; no request is
    ///   sent in either case.
    /// - Errors from the join request or from opening the subscription.
    ///   The channel is always released before the error is returned.
    pub async fn join_match<C: MatchChannel>(&self, mut channel: C, code: &str) -> Result<Lobby<C>> {
        let code = code.trim();
        let checked = self.require_authenticated().and_then(|user_id| {
            if code.is_empty() {
                Err(LobbyError::InvalidArgument("match code must not be empty".into()))
            } else {
                Ok(user_id)
            }
        });
        let user_id = match checked {
            Ok(user_id) => user_id,
            Err(err) => {
                release(&mut channel, &err, &self.config).await;
                return Err(err);
            }
        };

        info!(user_id, code, "joining match");
        let result = match tokio::time::timeout(
            self.config.request_timeout,
            channel.join_match(user_id, code),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(LobbyError::Timeout),
        };

        match result {
            Ok(snapshot) => self.open_lobby(channel, snapshot).await,
            Err(err) => {
                warn!(user_id, code, error = %err, "join match failed");
                release(&mut channel, &err, &self.config).await;
                Err(err)
            }
        }
    }

    /// Open the lobby for a match the user already created or joined.
    ///
    /// `snapshot.members` becomes the initial roster before the subscribe
    /// request is sent.
    ///
    /// # Errors
    ///
    /// - [`LobbyError::NotAuthenticated`] when signed out.
    /// - Errors from [`LobbySubscription::open`]; the subscription is closed
    ///   before the error is returned.
    pub async fn open_lobby<C: MatchChannel>(
        &self,
        mut channel: C,
        snapshot: MatchSnapshot,
    ) -> Result<Lobby<C>> {
        let user_id = match self.require_authenticated() {
            Ok(user_id) => user_id,
            Err(err) => {
                release(&mut channel, &err, &self.config).await;
                return Err(err);
            }
        };

        let MatchSnapshot {
            match_id,
            code,
            members,
        } = snapshot;
        info!(match_id, code = %code, players = members.len(), "opening lobby");

        let initial = LobbyRoster::seeded(members);
        let (mut subscription, roster) =
            LobbySubscription::new(channel, match_id, user_id, initial, self.config.clone());

        if let Err(err) = subscription.open().await {
            subscription.close().await;
            return Err(err);
        }

        Ok(Lobby {
            code,
            subscription,
            roster,
            session: self.session.clone(),
        })
    }

    fn require_authenticated(&self) -> Result<UserId> {
        let identity = self.session.identity();
        if identity.is_authenticated() {
            Ok(identity.user_id)
        } else {
            Err(LobbyError::NotAuthenticated)
        }
    }
}

/// Release a channel that never got a subscription.
async fn release<C: ServiceChannel>(channel: &mut C, err: &LobbyError, config: &LobbyConfig) {
    if err.is_transport_failure() {
        channel.abort();
    } else {
        close_safely(channel, config.close_timeout).await;
    }
}
