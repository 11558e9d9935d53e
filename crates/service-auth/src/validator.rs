//! JWT validation against the signing key cache.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Both `alg` and `kid` headers are required
//! - The token's `alg` must match the algorithm registered for its key, which
//!   blocks algorithm substitution (e.g. an HS256 token against an RSA key)
//! - `exp`, `nbf` and `iat` are checked with the configured clock skew
//! - Rejections carry a fixed client-safe reason; malformed key material from
//!   the provider is an internal error and is never described to the client

use crate::config::AuthConfig;
use crate::errors::AuthError;
use crate::keys::KeyCache;
use crate::outcome::{AuthOutcome, RejectReason};
use common::jwt::{decode_header_fields, validate_iat, JwtValidationError};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// The only claim read after verification; the rest is left to handlers.
#[derive(Debug, Deserialize)]
struct TimeClaims {
    #[serde(default)]
    iat: Option<i64>,
}

/// What a failed signature/claims check means for the caller.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Reject(RejectReason),
    Internal(String),
}

fn verdict_for(kind: &ErrorKind) -> Verdict {
    match kind {
        ErrorKind::ExpiredSignature => Verdict::Reject(RejectReason::TokenExpired),
        ErrorKind::ImmatureSignature => Verdict::Reject(RejectReason::TokenNotValidYet),
        ErrorKind::InvalidSignature => Verdict::Reject(RejectReason::SignatureInvalid),
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::MissingAlgorithm => Verdict::Reject(RejectReason::TokenMalformed),
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            Verdict::Reject(RejectReason::AlgorithmInvalid)
        }
        ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::MissingRequiredClaim(_) => Verdict::Reject(RejectReason::TokenInvalid),
        other => Verdict::Internal(format!("{other:?}")),
    }
}

/// Validates bearer tokens using keys from a [`KeyCache`].
pub struct JwtValidator {
    keys: Arc<KeyCache>,
    key_wait_timeout: Duration,
    key_poll_interval: Duration,
    clock_skew: Duration,
}

impl JwtValidator {
    pub fn new(keys: Arc<KeyCache>, config: &AuthConfig) -> Self {
        Self {
            keys,
            key_wait_timeout: config.key_wait_timeout,
            key_poll_interval: config.key_poll_interval,
            clock_skew: config.clock_skew,
        }
    }

    /// Validate a compact JWT.
    ///
    /// # Steps
    ///
    /// 1. Size check and header parse
    /// 2. Require `alg` and `kid`
    /// 3. Resolve the key, waiting if a key refresh is due
    /// 4. Case-insensitive `alg` match against the key
    /// 5. Parse the key's PEM material
    /// 6. Verify signature, `exp`, `nbf`, then `iat`
    ///
    /// # Errors
    ///
    /// Only for conditions the caller did not cause:
    /// - `AuthError::KeyMaterial` - the cached key's PEM does not parse
    /// - `AuthError::Verification` - the crypto backend failed unexpectedly
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<AuthOutcome, AuthError> {
        let header = match decode_header_fields(token) {
            Ok(header) => header,
            Err(JwtValidationError::TokenTooLarge) => {
                return Ok(RejectReason::TokenTooLarge.into());
            }
            Err(e) => {
                tracing::debug!(target: "auth.jwt", error = %e, "Token header rejected");
                return Ok(RejectReason::TokenMalformed.into());
            }
        };

        let Some(alg) = header.alg else {
            return Ok(RejectReason::AlgorithmMissing.into());
        };
        let Some(kid) = header.kid else {
            return Ok(RejectReason::KeyIdMissing.into());
        };

        let Some(key) = self
            .keys
            .await_key(&kid, self.key_wait_timeout, self.key_poll_interval)
            .await
        else {
            tracing::debug!(target: "auth.jwt", kid = %kid, "No signing key for token");
            return Ok(RejectReason::KeyNotFound.into());
        };

        if !key.alg.eq_ignore_ascii_case(&alg) {
            tracing::debug!(
                target: "auth.jwt",
                kid = %kid,
                token_alg = %alg,
                key_alg = %key.alg,
                "Token algorithm does not match key"
            );
            return Ok(RejectReason::AlgorithmInvalid.into());
        }

        let decoding_key = DecodingKey::from_rsa_pem(key.pem.as_bytes()).map_err(|e| {
            tracing::error!(target: "auth.jwt", kid = %kid, error = %e, "Signing key has unusable PEM material");
            AuthError::KeyMaterial(format!("kid {kid}: {e}"))
        })?;

        let Ok(algorithm) = Algorithm::from_str(&key.alg.to_ascii_uppercase()) else {
            tracing::debug!(target: "auth.jwt", kid = %kid, key_alg = %key.alg, "Unsupported algorithm");
            return Ok(RejectReason::AlgorithmInvalid.into());
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = self.clock_skew.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        // exp is checked when present but not mandatory
        validation.required_spec_claims.clear();

        let claims = match decode::<TimeClaims>(token, &decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                return match verdict_for(e.kind()) {
                    Verdict::Reject(reason) => {
                        tracing::debug!(target: "auth.jwt", kid = %kid, error = %e, "Token rejected");
                        Ok(reason.into())
                    }
                    Verdict::Internal(detail) => {
                        tracing::error!(target: "auth.jwt", kid = %kid, error = %e, "Token verification failed unexpectedly");
                        Err(AuthError::Verification(detail))
                    }
                };
            }
        };

        if let Some(iat) = claims.iat {
            if validate_iat(iat, self.clock_skew).is_err() {
                return Ok(RejectReason::UsedBeforeIssued.into());
            }
        }

        tracing::debug!(target: "auth.jwt", kid = %kid, "Token validated successfully");
        Ok(AuthOutcome::Authenticated)
    }
}
