//! Bearer credential extraction.

use crate::outcome::RejectReason;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use common::jwt::{decode_claims_unverified, JwtValidationError};
use serde::de::DeserializeOwned;

const BEARER_PREFIX_LEN: usize = "bearer ".len();

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively and surrounding whitespace is
/// trimmed from the token.
///
/// # Errors
///
/// - `MissingAuthorizationHeader` - header absent or empty
/// - `MalformedAuthorizationHeader` - not UTF-8 or not the bearer scheme
/// - `MissingBearerToken` - scheme present but no token after it
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, RejectReason> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Err(RejectReason::MissingAuthorizationHeader);
    };
    if value.is_empty() {
        return Err(RejectReason::MissingAuthorizationHeader);
    }

    let value = value
        .to_str()
        .map_err(|_| RejectReason::MalformedAuthorizationHeader)?;

    let is_bearer = value
        .get(..BEARER_PREFIX_LEN)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("bearer "));
    if !is_bearer {
        return Err(RejectReason::MalformedAuthorizationHeader);
    }

    let token = value.get(BEARER_PREFIX_LEN..).unwrap_or_default().trim();
    if token.is_empty() {
        return Err(RejectReason::MissingBearerToken);
    }

    Ok(token)
}

/// Errors from [`parse_claims_from_headers`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimsError {
    #[error("No bearer token: {0}")]
    NoToken(RejectReason),

    #[error(transparent)]
    Jwt(#[from] JwtValidationError),
}

/// Decode the bearer token's payload into `T` WITHOUT verifying it.
///
/// Only for handlers mounted behind the auth guard, where the token has
/// already been authenticated.
///
/// # Errors
///
/// Returns `ClaimsError::NoToken` when no bearer token is present and
/// `ClaimsError::Jwt` when the payload cannot be decoded into `T`.
pub fn parse_claims_from_headers<T: DeserializeOwned>(headers: &HeaderMap) -> Result<T, ClaimsError> {
    let token = extract_bearer_token(headers).map_err(ClaimsError::NoToken)?;
    Ok(decode_claims_unverified(token)?)
}
