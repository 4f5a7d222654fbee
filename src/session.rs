//! Process-wide session identity.
//!
//! [`SessionState`] is the single source of truth for "who is using this
//! client right now". It is a cheap, clonable handle: construct one at
//! startup and pass clones to every component that needs the identity.
//!
//! Every mutation swaps the whole [`SessionIdentity`] record, so readers
//! always observe either the empty identity or a fully signed-in one.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::error::{LobbyError, Result};

/// Unique identifier for users.
pub type UserId = i64;

/// User id carried by the empty identity.
const SIGNED_OUT_USER_ID: UserId = 0;

/// Immutable snapshot of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionIdentity {
    /// Account id; `0` when nobody is signed in.
    pub user_id: UserId,
    pub display_name: String,
    pub email: String,
    /// Opaque token issued at sign-in.
    pub auth_token: String,
}

impl SessionIdentity {
    /// Returns `true` when the identity belongs to a signed-in user.
    pub fn is_authenticated(&self) -> bool {
        self.user_id > SIGNED_OUT_USER_ID && !self.email.trim().is_empty()
    }
}

/// Shared handle to the session identity.
///
/// Cloning the handle shares the underlying record.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    inner: Arc<RwLock<Arc<SessionIdentity>>>,
}

impl SessionState {
    /// Create a session handle holding the empty identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign a user in, replacing the whole identity record.
    ///
    /// Missing display name or email are stored as empty strings.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::InvalidArgument`] if `user_id` is not positive.
    /// The previous identity is left untouched in that case.
    pub fn sign_in(
        &self,
        user_id: UserId,
        display_name: Option<&str>,
        email: Option<&str>,
        auth_token: impl Into<String>,
    ) -> Result<()> {
        if user_id <= SIGNED_OUT_USER_ID {
            return Err(LobbyError::InvalidArgument(format!(
                "user id must be positive, got {user_id}"
            )));
        }

        let identity = SessionIdentity {
            user_id,
            display_name: display_name.unwrap_or_default().to_owned(),
            email: email.unwrap_or_default().to_owned(),
            auth_token: auth_token.into(),
        };
        self.replace(identity);
        info!(user_id, "session signed in");
        Ok(())
    }

    /// Reset to the empty identity. Calling this while signed out is a no-op.
    pub fn sign_out(&self) {
        self.replace(SessionIdentity::default());
        debug!("session signed out");
    }

    /// Returns `true` if a user is signed in.
    pub fn is_authenticated(&self) -> bool {
        self.identity().is_authenticated()
    }

    /// Returns a consistent snapshot of the current identity.
    pub fn identity(&self) -> Arc<SessionIdentity> {
        Arc::clone(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Returns the signed-in user's id, or `0` when signed out.
    pub fn user_id(&self) -> UserId {
        self.identity().user_id
    }

    /// Returns `true` if `user_id` is the signed-in user.
    pub fn is_local_user(&self, user_id: UserId) -> bool {
        let identity = self.identity();
        identity.is_authenticated() && identity.user_id == user_id
    }

    /// Change the signed-in user's display name.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::NotAuthenticated`] when signed out.
    pub fn update_display_name(&self, display_name: Option<&str>) -> Result<()> {
        let display_name = display_name.unwrap_or_default().to_owned();
        self.update(|identity| identity.display_name = display_name)
    }

    /// Change the signed-in user's email.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::NotAuthenticated`] when signed out.
    pub fn update_email(&self, email: Option<&str>) -> Result<()> {
        let email = email.unwrap_or_default().to_owned();
        self.update(|identity| identity.email = email)
    }

    /// Replace the signed-in user's auth token.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::NotAuthenticated`] when signed out.
    pub fn update_auth_token(&self, auth_token: impl Into<String>) -> Result<()> {
        let auth_token = auth_token.into();
        self.update(|identity| identity.auth_token = auth_token)
    }

    fn replace(&self, identity: SessionIdentity) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(identity);
    }

    /// Copy-on-write edit of a signed-in identity, under one write lock.
    fn update(&self, edit: impl FnOnce(&mut SessionIdentity)) -> Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if guard.user_id <= SIGNED_OUT_USER_ID {
            return Err(LobbyError::NotAuthenticated);
        }
        let mut next = SessionIdentity::clone(&guard);
        edit(&mut next);
        *guard = Arc::new(next);
        Ok(())
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

    #[test]
    fn starts_signed_out() {
        let session = SessionState::new();
        assert!(!session.is_authenticated());
        assert_eq!(*session.identity(), SessionIdentity::default());
    }

    #[test]
    fn sign_in_with_zero_id_is_rejected() {
        let session = SessionState::new();
        let err = session
            .sign_in(0, Some("Ana"), Some("ana@example.com"), "tok")
            .unwrap_err();
        assert!(matches!(err, LobbyError::InvalidArgument(_)));
        assert!(!session.is_authenticated());
        assert_eq!(session.user_id(), 0);
    }

    #[test]
    fn sign_in_with_negative_id_keeps_previous_identity() {
        let session = SessionState::new();
        session
            .sign_in(5, Some("Ana"), Some("ana@example.com"), "tok")
            .unwrap();
        assert!(session.sign_in(-3, Some("Bob"), Some("bob@example.com"), "x").is_err());
        assert_eq!(session.identity().display_name, "Ana");
        assert_eq!(session.user_id(), 5);
    }

    #[test]
    fn sign_in_sets_all_fields() {
        let session = SessionState::new();
        session
            .sign_in(7, Some("Ana"), Some("ana@example.com"), "tok-1")
            .unwrap();

        let identity = session.identity();
        assert_eq!(identity.user_id, 7);
        assert_eq!(identity.display_name, "Ana");
        assert_eq!(identity.email, "ana@example.com");
        assert_eq!(identity.auth_token, "tok-1");
        assert!(session.is_authenticated());
    }

    #[test]
    fn blank_email_is_not_authenticated() {
        let session = SessionState::new();
        session.sign_in(7, Some("Ana"), None, "tok").unwrap();
        assert!(!session.is_authenticated());
        assert_eq!(session.identity().email, "");
    }

    #[test]
    fn sign_out_is_idempotent() {
        let session = SessionState::new();
        session
            .sign_in(7, Some("Ana"), Some("ana@example.com"), "tok")
            .unwrap();
        session.sign_out();
        session.sign_out();
        assert!(!session.is_authenticated());
        assert_eq!(*session.identity(), SessionIdentity::default());
    }

    #[test]
    fn clones_share_identity() {
        let session = SessionState::new();
        let reader = session.clone();
        session
            .sign_in(9, Some("Ana"), Some("ana@example.com"), "tok")
            .unwrap();
        assert_eq!(reader.user_id(), 9);
        assert!(reader.is_local_user(9));
        assert!(!reader.is_local_user(10));
    }

    #[test]
    fn updates_require_sign_in() {
        let session = SessionState::new();
        assert!(matches!(
            session.update_display_name(Some("Ghost")),
            Err(LobbyError::NotAuthenticated)
        ));
        assert_eq!(*session.identity(), SessionIdentity::default());
    }

    #[test]
    fn updates_replace_single_field() {
        let session = SessionState::new();
        session
            .sign_in(7, Some("Ana"), Some("ana@example.com"), "tok")
            .unwrap();
        let before = session.identity();

        session.update_display_name(Some("Ana B")).unwrap();
        session.update_email(Some("anab@example.com")).unwrap();
        session.update_auth_token("tok-2").unwrap();

        let after = session.identity();
        assert_eq!(after.user_id, 7);
        assert_eq!(after.display_name, "Ana B");
        assert_eq!(after.email, "anab@example.com");
        assert_eq!(after.auth_token, "tok-2");
        // Old snapshots are immutable.
        assert_eq!(before.display_name, "Ana");
    }

    #[test]
    fn concurrent_readers_never_see_torn_identity() {
        let session = SessionState::new();
        let writer = session.clone();

        let handle = std::thread::spawn(move || {
            for i in 1..=500 {
                writer
                    .sign_in(i, Some(&format!("user-{i}")), Some("u@example.com"), "t")
                    .unwrap();
                writer.sign_out();
            }
        });

        for _ in 0..2_000 {
            let identity = session.identity();
            if identity.user_id == 0 {
                assert!(identity.display_name.is_empty());
                assert!(identity.email.is_empty());
            } else {
                assert_eq!(identity.display_name, format!("user-{}", identity.user_id));
                assert_eq!(identity.email, "u@example.com");
            }
        }

        handle.join().unwrap();
    }
}
