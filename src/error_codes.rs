//! Fault codes for structured service faults.
//!
//! These codes travel inside `Fault` server messages and serialize using
//! `SCREAMING_SNAKE_CASE` to match the match service's JSON format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable fault codes returned by the match service.
///
/// The service sends these as `"SCREAMING_SNAKE_CASE"` strings (e.g.,
/// `"MATCH_FULL"`). Codes this client does not know decode as
/// [`FaultCode::Unknown`] instead of failing the whole message.
///
/// Use [`description()`](FaultCode::description) for a human-readable explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultCode {
    // Identity errors
    Unauthorized,
    UserNotFound,

    // Validation errors
    InvalidRequest,
    InvalidMatchCode,

    // Match errors
    MatchNotFound,
    MatchFull,
    MatchAlreadyStarted,
    AlreadyInMatch,
    NotInMatch,
    MatchCreationFailed,

    // Subscription errors
    AlreadySubscribed,
    NotSubscribed,

    // Server errors
    InternalError,
    DatabaseError,
    ServiceUnavailable,

    /// Any code this client version does not recognize.
    #[serde(other)]
    Unknown,
}

impl FaultCode {
    /// Returns the wire representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InvalidMatchCode => "INVALID_MATCH_CODE",
            Self::MatchNotFound => "MATCH_NOT_FOUND",
            Self::MatchFull => "MATCH_FULL",
            Self::MatchAlreadyStarted => "MATCH_ALREADY_STARTED",
            Self::AlreadyInMatch => "ALREADY_IN_MATCH",
            Self::NotInMatch => "NOT_IN_MATCH",
            Self::MatchCreationFailed => "MATCH_CREATION_FAILED",
            Self::AlreadySubscribed => "ALREADY_SUBSCRIBED",
            Self::NotSubscribed => "NOT_SUBSCRIBED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Returns a human-readable description of this fault code.
    ///
    /// Suitable for presentation layers that have no localized text of
    /// their own for a given code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unauthorized => "The session is not authorized to perform this operation.",
            Self::UserNotFound => "The user account could not be found. Sign in again.",
            Self::InvalidRequest => {
                "The request was invalid or malformed. Check the request parameters."
            }
            Self::InvalidMatchCode => {
                "The match code is invalid or malformed. Check the code and try again."
            }
            Self::MatchNotFound => {
                "The match could not be found. It may have ended or the code is incorrect."
            }
            Self::MatchFull => "The match lobby is full. Try joining a different match.",
            Self::MatchAlreadyStarted => {
                "The match has already started and no longer accepts players."
            }
            Self::AlreadyInMatch => {
                "You are already in a match. Leave it before joining another one."
            }
            Self::NotInMatch => "You are not a member of this match.",
            Self::MatchCreationFailed => {
                "The match could not be created. Please try again."
            }
            Self::AlreadySubscribed => "This client is already subscribed to the match lobby.",
            Self::NotSubscribed => "This client is not subscribed to the match lobby.",
            Self::InternalError => {
                "An internal server error occurred. Please try again or contact support if the issue persists."
            }
            Self::DatabaseError => {
                "A storage error occurred while processing the request. Please try again later."
            }
            Self::ServiceUnavailable => {
                "The service is temporarily unavailable. Please try again in a few moments."
            }
            Self::Unknown => "The service reported an unrecognized fault.",
        }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn as_str_matches_serde_name() {
        for code in [
            FaultCode::MatchFull,
            FaultCode::MatchNotFound,
            FaultCode::AlreadySubscribed,
            FaultCode::ServiceUnavailable,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn unrecognized_code_decodes_as_unknown() {
        let code: FaultCode = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(code, FaultCode::Unknown);
    }
}
