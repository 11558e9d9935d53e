//! Scriptable in-memory `AuthProvider`.
//!
//! Every behaviour can be changed while the provider is shared with an
//! `Auth` instance: swap keys to simulate rotation, script failures, add
//! latency to exercise coalescing and timeouts, and read call counters.
//!
//! # Example
//!
//! ```rust,ignore
//! use auth_test_utils::{test_signing_key, MockAuthProvider};
//!
//! let provider = Arc::new(
//!     MockAuthProvider::new()
//!         .with_keys(vec![test_signing_key("k1")])
//!         .with_token_delay(Duration::from_millis(100)),
//! );
//! let auth = Auth::new(provider.clone(), AuthConfig::default(), &cancel)?;
//!
//! auth.access_token().await?;
//! assert_eq!(provider.token_refresh_count(), 1);
//! ```

use async_trait::async_trait;
use axum::http::request::Parts;
use chrono::{Duration as ChronoDuration, Utc};
use service_auth::{
    AccessToken, AuthProvider, AuthRequirement, KeyRefresh, ProviderError, SigningKey,
    TokenRefresh,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Header the mock treats as marking a service caller.
pub const SERVICE_CALLER_HEADER: &str = "x-test-service";

#[derive(Debug)]
struct Script {
    keys: Vec<SigningKey>,
    key_refresh_in: ChronoDuration,
    key_error: Option<String>,
    key_delay: Duration,

    /// Fixed token value; `None` issues `token-<n>` per refresh.
    token_value: Option<String>,
    token_expires_in: ChronoDuration,
    token_refresh_in: ChronoDuration,
    token_error: Option<String>,
    token_delay: Duration,

    authorize_error: Option<String>,
    last_requirement: Option<AuthRequirement>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            key_refresh_in: ChronoDuration::hours(12),
            key_error: None,
            key_delay: Duration::ZERO,
            token_value: None,
            token_expires_in: ChronoDuration::hours(1),
            token_refresh_in: ChronoDuration::minutes(55),
            token_error: None,
            token_delay: Duration::ZERO,
            authorize_error: None,
            last_requirement: None,
        }
    }
}

/// Mock provider for tests.
#[derive(Debug, Default)]
pub struct MockAuthProvider {
    script: Mutex<Script>,
    authorized: AtomicBool,
    key_refresh_count: AtomicUsize,
    token_refresh_count: AtomicUsize,
    authorize_count: AtomicUsize,
}

impl MockAuthProvider {
    /// A provider with no keys that authorizes every request.
    pub fn new() -> Self {
        Self {
            authorized: AtomicBool::new(true),
            ..Self::default()
        }
    }

    // -------------------------------------------------------------------------
    // Builder-style setup
    // -------------------------------------------------------------------------

    pub fn with_keys(self, keys: Vec<SigningKey>) -> Self {
        self.set_keys(keys);
        self
    }

    /// How far in the future each key refresh schedules the next one.
    pub fn with_key_refresh_in(self, interval: ChronoDuration) -> Self {
        self.script.lock().unwrap().key_refresh_in = interval;
        self
    }

    pub fn with_token(self, value: &str, expires_in: ChronoDuration) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            script.token_value = Some(value.to_string());
            script.token_expires_in = expires_in;
        }
        self
    }

    /// How far in the future each token refresh schedules the next one.
    pub fn with_token_refresh_in(self, interval: ChronoDuration) -> Self {
        self.script.lock().unwrap().token_refresh_in = interval;
        self
    }

    pub fn with_token_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().token_delay = delay;
        self
    }

    pub fn with_key_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().key_delay = delay;
        self
    }

    pub fn denying(self) -> Self {
        self.set_authorized(false);
        self
    }

    // -------------------------------------------------------------------------
    // Runtime changes
    // -------------------------------------------------------------------------

    /// Replace the key generation returned by the next refresh.
    pub fn set_keys(&self, keys: Vec<SigningKey>) {
        self.script.lock().unwrap().keys = keys;
    }

    /// Make key refreshes fail (`Some`) or succeed (`None`).
    pub fn fail_key_refresh(&self, message: Option<&str>) {
        self.script.lock().unwrap().key_error = message.map(ToString::to_string);
    }

    /// Make token refreshes fail (`Some`) or succeed (`None`).
    pub fn fail_token_refresh(&self, message: Option<&str>) {
        self.script.lock().unwrap().token_error = message.map(ToString::to_string);
    }

    /// Make authorization checks fail (`Some`) or succeed (`None`).
    pub fn fail_authorize(&self, message: Option<&str>) {
        self.script.lock().unwrap().authorize_error = message.map(ToString::to_string);
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn key_refresh_count(&self) -> usize {
        self.key_refresh_count.load(Ordering::SeqCst)
    }

    pub fn token_refresh_count(&self) -> usize {
        self.token_refresh_count.load(Ordering::SeqCst)
    }

    pub fn authorize_count(&self) -> usize {
        self.authorize_count.load(Ordering::SeqCst)
    }

    /// The combined requirement passed to the last authorization check.
    pub fn last_requirement(&self) -> Option<AuthRequirement> {
        self.script.lock().unwrap().last_requirement.clone()
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn authorize_request(
        &self,
        _request: &Parts,
        requirement: &AuthRequirement,
    ) -> Result<bool, ProviderError> {
        self.authorize_count.fetch_add(1, Ordering::SeqCst);

        let error = {
            let mut script = self.script.lock().unwrap();
            script.last_requirement = Some(requirement.clone());
            script.authorize_error.clone()
        };
        if let Some(message) = error {
            return Err(ProviderError::new(message));
        }

        Ok(self.authorized.load(Ordering::SeqCst))
    }

    fn is_service_request(&self, request: &Parts) -> bool {
        request.headers.contains_key(SERVICE_CALLER_HEADER)
    }

    async fn refresh_access_token(&self) -> Result<TokenRefresh, ProviderError> {
        let count = self.token_refresh_count.fetch_add(1, Ordering::SeqCst) + 1;

        let (delay, error, value, expires_in, refresh_in) = {
            let script = self.script.lock().unwrap();
            (
                script.token_delay,
                script.token_error.clone(),
                script.token_value.clone(),
                script.token_expires_in,
                script.token_refresh_in,
            )
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = error {
            return Err(ProviderError::new(message));
        }

        let now = Utc::now();
        let value = value.unwrap_or_else(|| format!("token-{count}"));
        Ok(TokenRefresh {
            token: AccessToken::new(value, now + expires_in),
            next_refresh: now + refresh_in,
        })
    }

    async fn refresh_keys(&self) -> Result<KeyRefresh, ProviderError> {
        self.key_refresh_count.fetch_add(1, Ordering::SeqCst);

        let (delay, error, keys, refresh_in) = {
            let script = self.script.lock().unwrap();
            (
                script.key_delay,
                script.key_error.clone(),
                script.keys.clone(),
                script.key_refresh_in,
            )
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = error {
            return Err(ProviderError::new(message));
        }

        Ok(KeyRefresh {
            keys,
            next_refresh: Utc::now() + refresh_in,
        })
    }
}
