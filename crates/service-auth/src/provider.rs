//! The integrator-supplied provider contract.
//!
//! The auth subsystem never decides policy and never talks to a key or token
//! issuer on its own. Both are delegated to an [`AuthProvider`] implementation.

use crate::errors::ProviderError;
use crate::keys::SigningKey;
use crate::requirement::AuthRequirement;
use crate::token::AccessToken;
use async_trait::async_trait;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};

/// Result of a successful access token refresh.
#[derive(Debug, Clone)]
pub struct TokenRefresh {
    /// The new token presented to downstream services.
    pub token: AccessToken,

    /// When the scheduler should refresh again. Usually earlier than
    /// `token.expires_at` so renewal happens before expiry is imminent.
    pub next_refresh: DateTime<Utc>,
}

/// Result of a successful key refresh. The key list is a full generation.
#[derive(Debug, Clone)]
pub struct KeyRefresh {
    pub keys: Vec<SigningKey>,
    pub next_refresh: DateTime<Utc>,
}

/// Policy and backing-store hooks supplied by the integrator.
///
/// Implementations must be cheap to share: the auth instance holds a single
/// `Arc<dyn AuthProvider>` and calls it from the background scheduler and
/// from request handlers concurrently.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Decide whether an already authenticated request satisfies `requirement`.
    ///
    /// `Ok(false)` is a policy denial; `Err` is an infrastructure failure.
    async fn authorize_request(
        &self,
        request: &Parts,
        requirement: &AuthRequirement,
    ) -> Result<bool, ProviderError>;

    /// Whether the request originates from another service rather than a user.
    fn is_service_request(&self, request: &Parts) -> bool;

    /// Obtain a fresh access token for outbound calls.
    async fn refresh_access_token(&self) -> Result<TokenRefresh, ProviderError>;

    /// Obtain the full current set of signature-verification keys.
    async fn refresh_keys(&self) -> Result<KeyRefresh, ProviderError>;
}
