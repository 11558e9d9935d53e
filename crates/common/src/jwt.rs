//! JWT utilities shared across services.
//!
//! This module provides the pieces of JWT handling that do not need a key:
//! - Size limits for DoS prevention
//! - Clock skew bounds
//! - Header field extraction (`alg`, `kid`) without signature verification
//! - Unverified payload decoding for handlers running behind an auth guard
//! - iat validation logic
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing here verifies a signature; callers must verify before trusting
//!   any value other than the header fields used for key lookup
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_header_fields, validate_iat};
//!
//! let header = decode_header_fields(token)?;
//! let kid = header.kid.ok_or("no kid")?;
//!
//! // After signature verification, validate iat
//! validate_iat(claims.iat, clock_skew)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this size are rejected BEFORE any base64 decoding or
/// cryptographic operations. Typical RS256 tokens are well under 2KB.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (none).
///
/// Expiry, not-before and issued-at are evaluated against the local clock
/// exactly unless a deployment opts into a leeway.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(0);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// This prevents misconfiguration that could weaken security by allowing
/// excessively large clock skew tolerance.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a JWT without a key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("Token exceeds maximum allowed size")]
    TokenTooLarge,

    /// Token format is invalid (not header.payload.signature, bad base64, bad JSON).
    #[error("Token is malformed")]
    MalformedToken,

    /// Token payload could not be deserialized into the requested claims type.
    #[error("Token claims are invalid: {0}")]
    InvalidClaims(String),

    /// Token `iat` claim is too far in the future.
    #[error("Token used before being issued")]
    IatTooFarInFuture,
}

// =============================================================================
// Header Types
// =============================================================================

/// The header fields needed to pick a verification key.
///
/// Both fields are `None` when absent, empty, or not a JSON string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    /// Declared signature algorithm (`alg`).
    pub alg: Option<String>,

    /// Key identifier (`kid`).
    pub kid: Option<String>,
}

// =============================================================================
// Functions
// =============================================================================

/// Split a compact JWT into its three segments after the size check.
fn split_token(token: &str) -> Result<(&str, &str, &str), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) if !header.is_empty() => {
            Ok((header, payload, signature))
        }
        _ => {
            tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

/// Extract the `alg` and `kid` header fields without verifying the signature.
///
/// Missing fields are reported as `None` rather than errors so the caller can
/// tell the client exactly which one was absent.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - wrong structure, bad base64, or header is not a JSON object
pub fn decode_header_fields(token: &str) -> Result<HeaderFields, JwtValidationError> {
    let (header_part, _, _) = split_token(token)?;

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    if !header.is_object() {
        return Err(JwtValidationError::MalformedToken);
    }

    let field = |name: &str| {
        header
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    };

    Ok(HeaderFields {
        alg: field("alg"),
        kid: field("kid"),
    })
}

/// Decode the payload of a JWT into `T` WITHOUT verifying the signature.
///
/// Only use this for tokens that have already been authenticated, e.g. in a
/// handler mounted behind the auth guard.
///
/// # Errors
///
/// - `TokenTooLarge` / `MalformedToken` - see [`decode_header_fields`]
/// - `InvalidClaims` - the payload JSON does not match `T`
pub fn decode_claims_unverified<T: DeserializeOwned>(token: &str) -> Result<T, JwtValidationError> {
    let (_, payload_part, _) = split_token(token)?;

    let payload_bytes = URL_SAFE_NO_PAD.decode(payload_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT payload base64");
        JwtValidationError::MalformedToken
    })?;

    serde_json::from_slice(&payload_bytes)
        .map_err(|e| JwtValidationError::InvalidClaims(e.to_string()))
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// Rejects tokens whose `iat` lies more than `clock_skew` in the future.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
///
/// Prefer [`validate_iat`] in production code. This variant exists so that
/// boundary conditions can be unit-tested without wall-clock dependence.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    let clock_skew_secs = i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX);
    let max_iat = now.saturating_add(clock_skew_secs);

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
