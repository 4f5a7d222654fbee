//! Error types for the lobby sync client.

use thiserror::Error;

use crate::error_codes::FaultCode;

/// Errors that can occur while driving a match lobby.
#[derive(Debug, Error)]
pub enum LobbyError {
    /// A local operation was called with an invalid argument
    /// (e.g. signing in with a non-positive user id).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not valid in the handle's current state
    /// (e.g. opening a subscription that is already subscribed).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The operation requires a signed-in session.
    #[error("no authenticated session")]
    NotAuthenticated,

    /// The remote service returned a structured fault.
    #[error("service fault ({code}): {message}")]
    ServiceFault {
        /// Machine-readable fault code.
        code: FaultCode,
        /// Human-readable message from the service.
        message: String,
    },

    /// A remote call did not complete within its timeout.
    #[error("operation timed out")]
    Timeout,

    /// The remote channel failed at the communication level.
    #[error("communication failure: {0}")]
    CommunicationFailure(String),

    /// The channel was used after it had been closed or aborted.
    #[error("channel has been disposed")]
    ChannelDisposed,

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LobbyError {
    /// Returns `true` for transport-level failures that leave a channel
    /// unusable (timeouts and communication errors).
    ///
    /// Service faults and local validation errors are not transport failures:
    /// the channel is still healthy after them.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            LobbyError::Timeout
                | LobbyError::CommunicationFailure(_)
                | LobbyError::ChannelDisposed
                | LobbyError::TransportSend(_)
                | LobbyError::TransportReceive(_)
                | LobbyError::TransportClosed
                | LobbyError::Io(_)
        )
    }
}

/// A specialized [`Result`] type for lobby operations.
pub type Result<T> = std::result::Result<T, LobbyError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_classified() {
        assert!(LobbyError::Timeout.is_transport_failure());
        assert!(LobbyError::CommunicationFailure("reset".into()).is_transport_failure());
        assert!(LobbyError::TransportClosed.is_transport_failure());
        assert!(!LobbyError::NotAuthenticated.is_transport_failure());
        assert!(!LobbyError::ServiceFault {
            code: FaultCode::MatchFull,
            message: "full".into(),
        }
        .is_transport_failure());
    }

    #[test]
    fn service_fault_display_includes_code() {
        let err = LobbyError::ServiceFault {
            code: FaultCode::MatchNotFound,
            message: "no such match".into(),
        };
        assert_eq!(
            err.to_string(),
            "service fault (MATCH_NOT_FOUND): no such match"
        );
    }
}
