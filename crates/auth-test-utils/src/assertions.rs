//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions for authentication outcomes.

use service_auth::{AuthError, AuthOutcome, RejectReason};

/// Assertions on the result of `Auth::authenticate` / `Auth::validate_token`.
///
/// # Example
/// ```rust,ignore
/// auth.validate_token(&token)
///     .await
///     .assert_rejected_with(RejectReason::TokenExpired);
/// ```
pub trait OutcomeAssertions {
    /// Assert the request was authenticated
    fn assert_authenticated(&self);

    /// Assert the request was rejected with exactly `reason`
    fn assert_rejected_with(&self, reason: RejectReason);

    /// Assert validation failed with an infrastructure error, returning it
    fn assert_internal_error(&self) -> &AuthError;
}

impl OutcomeAssertions for Result<AuthOutcome, AuthError> {
    fn assert_authenticated(&self) {
        match self {
            Ok(AuthOutcome::Authenticated) => {}
            Ok(AuthOutcome::Rejected(reason)) => {
                panic!("expected authenticated, got rejection: {reason}")
            }
            Err(e) => panic!("expected authenticated, got error: {e}"),
        }
    }

    fn assert_rejected_with(&self, expected: RejectReason) {
        match self {
            Ok(AuthOutcome::Rejected(reason)) => assert_eq!(
                *reason, expected,
                "expected rejection '{expected}', got '{reason}'"
            ),
            Ok(AuthOutcome::Authenticated) => {
                panic!("expected rejection '{expected}', got authenticated")
            }
            Err(e) => panic!("expected rejection '{expected}', got error: {e}"),
        }
    }

    fn assert_internal_error(&self) -> &AuthError {
        match self {
            Err(e) => e,
            Ok(outcome) => panic!("expected infrastructure error, got {outcome:?}"),
        }
    }
}
