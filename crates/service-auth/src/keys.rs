//! Signing key cache and the await-key protocol.
//!
//! The cache holds one generation of verification keys plus the time the
//! provider asked to be refreshed next. A refresh replaces the whole
//! generation atomically; readers never see a partially installed set.
//!
//! # Await-key
//!
//! A token may reference a key that is about to arrive: the provider rotated
//! keys and the scheduler has not yet installed the new generation. When a
//! lookup misses while a refresh is due, [`KeyCache::await_key`] polls for a
//! bounded window instead of rejecting immediately. When no refresh is due
//! the key simply does not exist and the lookup fails without waiting.

use crate::errors::AuthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::instrument;

/// A signature-verification key issued by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    /// Key identifier, unique within one generation.
    pub kid: String,

    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,

    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,

    /// Signature algorithm, e.g. `RS256`.
    pub alg: String,

    /// RSA public key in PEM format.
    pub pem: String,
}

impl SigningKey {
    /// Check that every field is populated.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidSigningKey` naming the first empty field.
    pub fn validate(&self) -> Result<(), AuthError> {
        let problem = if self.kid.is_empty() {
            "kid is empty"
        } else if self.iat == 0 {
            "iat is zero"
        } else if self.exp == 0 {
            "exp is zero"
        } else if self.alg.is_empty() {
            "alg is empty"
        } else if self.pem.is_empty() {
            "pem is empty"
        } else {
            return Ok(());
        };

        Err(AuthError::InvalidSigningKey(problem.to_string()))
    }
}

/// One installed key generation.
struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,

    /// Starts in the distant past so a refresh is due before the first install.
    next_refresh: DateTime<Utc>,
}

/// Thread-safe key cache.
pub struct KeyCache {
    inner: RwLock<KeySet>,
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(KeySet {
                keys: HashMap::new(),
                next_refresh: DateTime::<Utc>::MIN_UTC,
            }),
        }
    }

    /// Non-blocking lookup by key id.
    pub async fn key_with_id(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.inner.read().await.keys.get(kid).cloned()
    }

    /// When the installed generation should be replaced.
    pub async fn next_refresh(&self) -> DateTime<Utc> {
        self.inner.read().await.next_refresh
    }

    /// Whether the refresh deadline has passed.
    pub async fn refresh_due(&self) -> bool {
        Utc::now() > self.next_refresh().await
    }

    /// Number of keys in the installed generation.
    pub async fn len(&self) -> usize {
        self.inner.read().await.keys.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Validate a full generation and swap it in.
    ///
    /// Either every key is installed or none is: one invalid key rejects the
    /// batch and leaves the previous generation in place.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidSigningKey` for the first invalid key.
    pub async fn install(
        &self,
        keys: Vec<SigningKey>,
        next_refresh: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut key_map = HashMap::with_capacity(keys.len());
        for key in keys {
            key.validate()?;
            key_map.insert(key.kid.clone(), Arc::new(key));
        }

        let count = key_map.len();
        {
            let mut set = self.inner.write().await;
            set.keys = key_map;
            set.next_refresh = next_refresh;
        }

        tracing::debug!(
            target: "auth.keys",
            key_count = count,
            next_refresh = %next_refresh,
            "Installed signing key generation"
        );

        Ok(())
    }

    /// Look up a key, waiting up to `max_wait` if a refresh is due.
    ///
    /// Polls every `poll_interval` while the refresh deadline stays in the
    /// past. Returns `None` as soon as the key is known not to be coming:
    /// either no refresh is due, or the window elapsed.
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn await_key(
        &self,
        kid: &str,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> Option<Arc<SigningKey>> {
        let start = Instant::now();
        let deadline = start + max_wait;
        let mut ticker = tokio::time::interval_at(start + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if let Some(key) = self.key_with_id(kid).await {
                return Some(key);
            }

            if !self.refresh_due().await {
                tracing::debug!(target: "auth.keys", kid = %kid, "Key not found and no refresh pending");
                return None;
            }

            tokio::select! {
                biased;
                _ = ticker.tick() => {}
                () = tokio::time::sleep_until(deadline) => {
                    tracing::debug!(
                        target: "auth.keys",
                        kid = %kid,
                        waited_ms = u64::try_from(max_wait.as_millis()).unwrap_or(u64::MAX),
                        "Timed out waiting for key refresh"
                    );
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn key(kid: &str) -> SigningKey {
        SigningKey {
            kid: kid.to_string(),
            iat: 1_700_000_000,
            exp: 1_800_000_000,
            alg: "RS256".to_string(),
            pem: "-----BEGIN PUBLIC KEY-----\n...\n-----END PUBLIC KEY-----".to_string(),
        }
    }

    fn in_one_hour() -> DateTime<Utc> {
        Utc::now() + ChronoDuration::hours(1)
    }

    #[test]
    fn test_validate_reports_first_empty_field() {
        assert!(key("k1").validate().is_ok());

        let cases: [(fn(&mut SigningKey), &str); 5] = [
            (|k| k.kid.clear(), "kid is empty"),
            (|k| k.iat = 0, "iat is zero"),
            (|k| k.exp = 0, "exp is zero"),
            (|k| k.alg.clear(), "alg is empty"),
            (|k| k.pem.clear(), "pem is empty"),
        ];

        for (mutate, expected) in cases {
            let mut k = key("k1");
            mutate(&mut k);
            assert_eq!(
                k.validate(),
                Err(AuthError::InvalidSigningKey(expected.to_string()))
            );
        }
    }

    #[test]
    fn test_signing_key_json_shape() {
        let json = r#"{"kid":"k1","iat":1700000000,"exp":1800000000,"alg":"RS256","pem":"p"}"#;
        let parsed: SigningKey = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.kid, "k1");
        assert_eq!(parsed.alg, "RS256");

        let round: serde_json::Value = serde_json::to_value(&parsed).unwrap();
        assert_eq!(round["pem"], "p");
    }

    #[tokio::test]
    async fn test_new_cache_is_due_for_refresh() {
        let cache = KeyCache::new();
        assert!(cache.is_empty().await);
        assert!(cache.refresh_due().await);
    }

    #[tokio::test]
    async fn test_install_and_lookup() {
        let cache = KeyCache::new();
        cache
            .install(vec![key("k1"), key("k2")], in_one_hour())
            .await
            .unwrap();

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.key_with_id("k1").await.unwrap().kid, "k1");
        assert!(cache.key_with_id("k3").await.is_none());
        assert!(!cache.refresh_due().await);
    }

    #[tokio::test]
    async fn test_install_replaces_whole_generation() {
        let cache = KeyCache::new();
        cache.install(vec![key("old")], in_one_hour()).await.unwrap();
        cache.install(vec![key("new")], in_one_hour()).await.unwrap();

        assert!(cache.key_with_id("old").await.is_none());
        assert!(cache.key_with_id("new").await.is_some());
    }

    #[tokio::test]
    async fn test_invalid_key_rejects_batch_and_keeps_previous() {
        let cache = KeyCache::new();
        let first_refresh = in_one_hour();
        cache.install(vec![key("k1")], first_refresh).await.unwrap();

        let mut bad = key("k3");
        bad.pem.clear();
        let result = cache
            .install(vec![key("k2"), bad], first_refresh + ChronoDuration::hours(1))
            .await;

        assert!(matches!(result, Err(AuthError::InvalidSigningKey(_))));
        assert!(cache.key_with_id("k1").await.is_some());
        assert!(cache.key_with_id("k2").await.is_none());
        assert_eq!(cache.next_refresh().await, first_refresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_key_fails_fast_when_no_refresh_due() {
        let cache = KeyCache::new();
        cache.install(vec![key("k1")], in_one_hour()).await.unwrap();

        let started = Instant::now();
        let found = cache
            .await_key("missing", Duration::from_secs(5), Duration::from_secs(1))
            .await;

        assert!(found.is_none());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_key_hit_returns_immediately() {
        let cache = KeyCache::new();
        cache.install(vec![key("k1")], in_one_hour()).await.unwrap();

        let found = cache
            .await_key("k1", Duration::from_secs(5), Duration::from_secs(1))
            .await;
        assert_eq!(found.unwrap().kid, "k1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_key_gives_up_after_window() {
        let cache = KeyCache::new();

        let started = Instant::now();
        let found = cache
            .await_key("k1", Duration::from_secs(5), Duration::from_secs(1))
            .await;

        assert!(found.is_none());
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_key_sees_key_installed_during_wait() {
        let cache = Arc::new(KeyCache::new());

        let installer = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(2500)).await;
                cache.install(vec![key("k1")], in_one_hour()).await.unwrap();
            })
        };

        let started = Instant::now();
        let found = cache
            .await_key("k1", Duration::from_secs(5), Duration::from_secs(1))
            .await;

        assert_eq!(found.unwrap().kid, "k1");
        // Picked up on the first poll after the install
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        installer.await.unwrap();
    }
}
