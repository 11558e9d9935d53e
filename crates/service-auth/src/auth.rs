//! The auth instance: inbound authentication, authorization delegation and
//! outbound access tokens.
//!
//! One [`Auth`] owns both caches. Only [`Auth::refresh_keys`] writes the key
//! cache and only a coalesced token refresh writes the access token cache;
//! everything else reads.

use crate::bearer::extract_bearer_token;
use crate::config::{AuthConfig, ConfigError};
use crate::errors::AuthError;
use crate::keys::KeyCache;
use crate::lifecycle::{LifecycleState, StateCell};
use crate::outcome::AuthOutcome;
use crate::provider::AuthProvider;
use crate::requirement::AuthRequirement;
use crate::singleflight::Group;
use crate::token::{AccessToken, AccessTokenCache};
use crate::validator::JwtValidator;
use axum::http::{request::Parts, HeaderMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Registry key for the single outbound token refresh episode.
const ACCESS_TOKEN_REFRESH: &str = "access_token";

/// Authentication subsystem handle.
///
/// Construct with [`Auth::new`], then call [`Auth::start`] once to begin
/// background refreshes.
pub struct Auth {
    provider: Arc<dyn AuthProvider>,
    config: AuthConfig,
    keys: Arc<KeyCache>,
    validator: JwtValidator,
    access_token: Arc<AccessTokenCache>,
    token_refresher: Group<AccessToken, AuthError>,
    /// Held across fetch and install so key generations land in call order.
    key_refresh: Mutex<()>,
    pub(crate) state: StateCell,
    pub(crate) cancel: CancellationToken,
}

impl Auth {
    /// Create an auth instance.
    ///
    /// The scheduler stops when `cancel` is cancelled or on [`Auth::shutdown`];
    /// shutting down never cancels the caller's token.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `config` fails validation.
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        config: AuthConfig,
        cancel: &CancellationToken,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;

        let keys = Arc::new(KeyCache::new());
        let validator = JwtValidator::new(Arc::clone(&keys), &config);

        Ok(Arc::new(Self {
            provider,
            config,
            keys,
            validator,
            access_token: Arc::new(AccessTokenCache::new()),
            token_refresher: Group::new(),
            key_refresh: Mutex::new(()),
            state: StateCell::new(),
            cancel: cancel.child_token(),
        }))
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Read access to the signing key cache.
    #[must_use]
    pub fn keys(&self) -> &KeyCache {
        &self.keys
    }

    /// Read access to the outbound token cache.
    #[must_use]
    pub fn access_token_cache(&self) -> &AccessTokenCache {
        &self.access_token
    }

    #[must_use]
    pub fn lifecycle_state(&self) -> LifecycleState {
        self.state.get()
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    /// Authenticate a request from its headers.
    ///
    /// A missing, malformed or invalid credential is `Ok(Rejected(..))`.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures, see [`JwtValidator::validate`].
    #[instrument(skip_all)]
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthOutcome, AuthError> {
        let token = match extract_bearer_token(headers) {
            Ok(token) => token,
            Err(reason) => {
                tracing::debug!(target: "auth.jwt", reason = %reason, "Request not authenticated");
                return Ok(reason.into());
            }
        };

        self.validate_token(token).await
    }

    /// Validate a bare token.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures, see [`JwtValidator::validate`].
    pub async fn validate_token(&self, token: &str) -> Result<AuthOutcome, AuthError> {
        self.validator.validate(token).await
    }

    /// Ask the provider whether the request satisfies the union of
    /// `requirements`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Authorization` if the provider fails.
    #[instrument(skip_all)]
    pub async fn authorize(
        &self,
        request: &Parts,
        requirements: &[AuthRequirement],
    ) -> Result<bool, AuthError> {
        let combined: AuthRequirement = requirements.iter().collect();

        self.provider
            .authorize_request(request, &combined)
            .await
            .map_err(|e| {
                tracing::warn!(target: "auth.middleware", error = %e, "Provider failed to authorize request");
                AuthError::Authorization(e)
            })
    }

    /// Whether the request comes from another service.
    pub fn is_service_request(&self, request: &Parts) -> bool {
        self.provider.is_service_request(request)
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    /// Fetch a full key generation from the provider and install it.
    ///
    /// On failure the previous generation stays in place. Concurrent calls
    /// run one at a time, so an older generation never replaces a newer one.
    ///
    /// # Errors
    ///
    /// - `AuthError::KeyRefresh` - the provider failed
    /// - `AuthError::InvalidSigningKey` - the provider returned an unusable key
    #[instrument(skip_all)]
    pub async fn refresh_keys(&self) -> Result<(), AuthError> {
        let _serialized = self.key_refresh.lock().await;

        let refresh = self.provider.refresh_keys().await.map_err(|e| {
            tracing::warn!(target: "auth.keys", error = %e, "Provider failed to refresh keys");
            AuthError::KeyRefresh(e)
        })?;

        self.keys
            .install(refresh.keys, refresh.next_refresh)
            .await
            .inspect_err(|e| {
                tracing::warn!(target: "auth.keys", error = %e, "Rejected key generation from provider");
            })
    }

    /// A valid access token, refreshing if necessary, waiting at most the
    /// configured token wait timeout.
    ///
    /// # Errors
    ///
    /// See [`Auth::access_token_with_timeout`].
    pub async fn access_token(&self) -> Result<AccessToken, AuthError> {
        self.access_token_with_timeout(self.config.token_wait_timeout)
            .await
    }

    /// A valid access token, refreshing if necessary.
    ///
    /// A cached, unexpired token is returned without touching the provider.
    /// Otherwise the caller joins the single in-flight refresh, starting one
    /// if none is running. Giving up after `timeout` does not cancel that
    /// refresh.
    ///
    /// # Errors
    ///
    /// - `AuthError::RefreshTimeout` - no result within `timeout`
    /// - `AuthError::TokenRefresh` / `AuthError::MissingAccessToken` - the
    ///   shared refresh failed
    #[instrument(skip_all)]
    pub async fn access_token_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<AccessToken, AuthError> {
        if let Some(token) = self.access_token.get_valid().await {
            return Ok(token);
        }

        match tokio::time::timeout(timeout, self.refresh_access_token()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    target: "auth.token",
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Timed out waiting for access token refresh"
                );
                Err(AuthError::RefreshTimeout)
            }
        }
    }

    /// Join or start the coalesced access token refresh.
    pub(crate) async fn refresh_access_token(&self) -> Result<AccessToken, AuthError> {
        let provider = Arc::clone(&self.provider);
        let cache = Arc::clone(&self.access_token);

        self.token_refresher
            .run(ACCESS_TOKEN_REFRESH, move || fetch_access_token(provider, cache))
            .await
    }
}

/// One refresh episode. Runs to completion regardless of who is waiting.
async fn fetch_access_token(
    provider: Arc<dyn AuthProvider>,
    cache: Arc<AccessTokenCache>,
) -> Result<AccessToken, AuthError> {
    tracing::debug!(target: "auth.token", "Refreshing access token");

    let refresh = provider.refresh_access_token().await.map_err(|e| {
        tracing::warn!(target: "auth.token", error = %e, "Provider failed to refresh access token");
        AuthError::TokenRefresh(e)
    })?;

    if refresh.token.is_empty() {
        tracing::warn!(target: "auth.token", "Provider returned an empty access token");
        return Err(AuthError::MissingAccessToken);
    }

    cache
        .store(refresh.token.clone(), refresh.next_refresh)
        .await;

    tracing::debug!(
        target: "auth.token",
        expires_at = %refresh.token.expires_at,
        next_refresh = %refresh.next_refresh,
        "Access token refreshed"
    );

    Ok(refresh.token)
}
