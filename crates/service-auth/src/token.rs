//! Outbound access token cache.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;

/// Credential this service presents to other services.
///
/// The token value is wrapped in `SecretString` so it is redacted in `Debug`
/// output and never ends up in logs.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_at,
        }
    }

    /// Whether the token is still usable at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Whether the token carries no value at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token.expose_secret().is_empty()
    }
}

#[derive(Default)]
struct TokenState {
    token: Option<AccessToken>,

    /// `None` until the first successful refresh; the scheduler does not
    /// refresh proactively before then.
    next_refresh: Option<DateTime<Utc>>,
}

/// Holds the current access token and the provider's requested refresh time.
///
/// Only the refresh path writes here; the transport reads on every request.
#[derive(Default)]
pub struct AccessTokenCache {
    inner: RwLock<TokenState>,
}

impl AccessTokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token if it has not expired.
    pub async fn get_valid(&self) -> Option<AccessToken> {
        let state = self.inner.read().await;
        state
            .token
            .as_ref()
            .filter(|t| t.is_valid_at(Utc::now()))
            .cloned()
    }

    /// Whether a proactive refresh is due. False until a first token exists.
    pub async fn refresh_due(&self) -> bool {
        self.inner
            .read()
            .await
            .next_refresh
            .is_some_and(|next| next < Utc::now())
    }

    pub async fn next_refresh(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.next_refresh
    }

    /// Replace the token and its refresh time together.
    pub async fn store(&self, token: AccessToken, next_refresh: DateTime<Utc>) {
        let mut state = self.inner.write().await;
        state.token = Some(token);
        state.next_refresh = Some(next_refresh);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_empty_cache() {
        let cache = AccessTokenCache::new();
        assert!(cache.get_valid().await.is_none());
        assert!(!cache.refresh_due().await);
        assert!(cache.next_refresh().await.is_none());
    }

    #[tokio::test]
    async fn test_store_and_read() {
        let cache = AccessTokenCache::new();
        let now = Utc::now();
        cache
            .store(
                AccessToken::new("tok-1", now + Duration::hours(1)),
                now + Duration::minutes(55),
            )
            .await;

        let token = cache.get_valid().await.unwrap();
        assert_eq!(token.token.expose_secret(), "tok-1");
        assert!(!cache.refresh_due().await);
    }

    #[tokio::test]
    async fn test_expired_token_is_not_returned() {
        let cache = AccessTokenCache::new();
        let now = Utc::now();
        cache
            .store(
                AccessToken::new("stale", now - Duration::seconds(1)),
                now - Duration::minutes(5),
            )
            .await;

        assert!(cache.get_valid().await.is_none());
        assert!(cache.refresh_due().await);
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = AccessToken::new("super-secret-value", Utc::now());
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret-value"));
    }
}
