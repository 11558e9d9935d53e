//! Policy results of authentication.
//!
//! A rejected token is a normal outcome, not an error. Every [`RejectReason`]
//! maps to a fixed message that is safe to send back to the caller.

use std::fmt;

/// Why a request was not authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    MissingAuthorizationHeader,
    MalformedAuthorizationHeader,
    MissingBearerToken,
    TokenTooLarge,
    TokenMalformed,
    AlgorithmMissing,
    KeyIdMissing,
    KeyNotFound,
    AlgorithmInvalid,
    TokenExpired,
    TokenNotValidYet,
    SignatureInvalid,
    UsedBeforeIssued,
    TokenInvalid,
}

impl RejectReason {
    /// Client-safe message.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::MissingAuthorizationHeader => "missing authorization header",
            RejectReason::MalformedAuthorizationHeader => "malformed authorization header",
            RejectReason::MissingBearerToken => "missing bearer token",
            RejectReason::TokenTooLarge => "token is too large",
            RejectReason::TokenMalformed => "token is malformed",
            RejectReason::AlgorithmMissing => "token header is missing an 'alg' value",
            RejectReason::KeyIdMissing => "token header is missing a 'kid' value",
            RejectReason::KeyNotFound => "key not found",
            RejectReason::AlgorithmInvalid => "value for algorithm header is invalid",
            RejectReason::TokenExpired => "token is expired",
            RejectReason::TokenNotValidYet => "token is not valid yet",
            RejectReason::SignatureInvalid => "token signature is invalid",
            RejectReason::UsedBeforeIssued => "token used before being issued",
            RejectReason::TokenInvalid => "token is not valid",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of authenticating a request or validating a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated,
    Rejected(RejectReason),
}

impl AuthOutcome {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated)
    }

    /// The client-safe reason, empty when authenticated.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            AuthOutcome::Authenticated => "",
            AuthOutcome::Rejected(reason) => reason.as_str(),
        }
    }
}

impl From<RejectReason> for AuthOutcome {
    fn from(reason: RejectReason) -> Self {
        AuthOutcome::Rejected(reason)
    }
}
