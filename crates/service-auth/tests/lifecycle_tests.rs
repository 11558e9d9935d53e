//! Lifecycle integration tests.
//!
//! Start/shutdown idempotency, the refresh error stream and the background
//! scheduler's provider-driven cadence. Runs with a paused clock so ticks are
//! deterministic.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use auth_test_utils::{test_signing_key, MockAuthProvider};
use chrono::Duration as ChronoDuration;
use service_auth::{Auth, AuthConfig, AuthError, LifecycleState};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn new_auth(provider: &Arc<MockAuthProvider>, cancel: &CancellationToken) -> Arc<Auth> {
    Auth::new(provider.clone(), AuthConfig::default(), cancel).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_start_runs_initial_key_refresh() {
    let provider = Arc::new(MockAuthProvider::new().with_keys(vec![test_signing_key("k1")]));
    let auth = new_auth(&provider, &CancellationToken::new());
    assert_eq!(auth.lifecycle_state(), LifecycleState::NotStarted);

    let _errors = auth.start().unwrap();
    assert_eq!(auth.lifecycle_state(), LifecycleState::Running);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(provider.key_refresh_count(), 1);
    assert!(auth.keys().key_with_id("k1").await.is_some());

    auth.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_second_start_is_ignored() {
    let provider = Arc::new(MockAuthProvider::new().with_keys(vec![test_signing_key("k1")]));
    let auth = new_auth(&provider, &CancellationToken::new());

    let first = auth.start();
    let second = auth.start();
    assert!(first.is_some());
    assert!(second.is_none());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(provider.key_refresh_count(), 1);

    auth.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_error_stream() {
    let provider = Arc::new(MockAuthProvider::new().with_keys(vec![test_signing_key("k1")]));
    let auth = new_auth(&provider, &CancellationToken::new());
    let mut errors = auth.start().unwrap();

    auth.shutdown();
    assert_eq!(auth.lifecycle_state(), LifecycleState::ShuttingDown);

    assert!(errors.recv().await.is_none());
    assert_eq!(auth.lifecycle_state(), LifecycleState::Stopped);

    // Further shutdowns are no-ops
    auth.shutdown();
    auth.shutdown();
    assert_eq!(auth.lifecycle_state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_shutdown_before_start() {
    let provider = Arc::new(MockAuthProvider::new());
    let auth = new_auth(&provider, &CancellationToken::new());

    auth.shutdown();
    assert_eq!(auth.lifecycle_state(), LifecycleState::Stopped);

    assert!(auth.start().is_none());
    assert_eq!(provider.key_refresh_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_stops_scheduler() {
    let parent = CancellationToken::new();
    let provider = Arc::new(MockAuthProvider::new().with_keys(vec![test_signing_key("k1")]));
    let auth = new_auth(&provider, &parent);
    let mut errors = auth.start().unwrap();

    parent.cancel();
    assert!(errors.recv().await.is_none());
    assert_eq!(auth.lifecycle_state(), LifecycleState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_does_not_cancel_parent() {
    let parent = CancellationToken::new();
    let provider = Arc::new(MockAuthProvider::new());
    let auth = new_auth(&provider, &parent);
    let _errors = auth.start();

    auth.shutdown();
    assert!(!parent.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_errors_are_reported() {
    let provider = Arc::new(MockAuthProvider::new());
    provider.fail_key_refresh(Some("key service unavailable"));
    let auth = new_auth(&provider, &CancellationToken::new());
    let mut errors = auth.start().unwrap();

    let err = errors.recv().await.unwrap();
    assert!(matches!(err, AuthError::KeyRefresh(_)));

    // No generation was installed, so the next tick retries
    let err = errors.recv().await.unwrap();
    assert!(matches!(err, AuthError::KeyRefresh(_)));
    assert!(provider.key_refresh_count() >= 2);

    auth.shutdown();
    while errors.recv().await.is_some() {}
    assert_eq!(auth.lifecycle_state(), LifecycleState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_keys_refresh_only_when_due() {
    let provider = Arc::new(MockAuthProvider::new().with_keys(vec![test_signing_key("k1")]));
    let auth = new_auth(&provider, &CancellationToken::new());
    let _errors = auth.start().unwrap();

    // Next refresh is 12 hours out, ticks are a no-op
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(provider.key_refresh_count(), 1);

    auth.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_due_keys_are_refreshed_on_tick() {
    let provider = Arc::new(
        MockAuthProvider::new()
            .with_keys(vec![test_signing_key("k1")])
            .with_key_refresh_in(ChronoDuration::seconds(-1)),
    );
    let auth = new_auth(&provider, &CancellationToken::new());
    let _errors = auth.start().unwrap();

    tokio::time::sleep(Duration::from_millis(3500)).await;
    // Initial refresh plus one per tick
    assert_eq!(provider.key_refresh_count(), 4);

    auth.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_token_refresh_waits_for_first_use() {
    let provider = Arc::new(
        MockAuthProvider::new().with_token_refresh_in(ChronoDuration::seconds(-1)),
    );
    let auth = new_auth(&provider, &CancellationToken::new());
    let _errors = auth.start().unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(provider.token_refresh_count(), 0);

    // Once a token has been fetched, an overdue refresh is picked up by the
    // next tick
    auth.access_token().await.unwrap();
    assert_eq!(provider.token_refresh_count(), 1);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(provider.token_refresh_count() >= 2);

    auth.shutdown();
}
