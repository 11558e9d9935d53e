//! Call coalescing for refresh operations.
//!
//! [`Group::run`] guarantees that at most one operation per key is in flight.
//! The first caller spawns the operation and installs a shared handle to its
//! result; callers arriving before it completes await the same handle. The
//! operation runs on its own task, so a caller that stops waiting (timeout,
//! dropped request) does not cancel it for anyone else.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinError;

type InFlight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// In-flight operation registry keyed by operation name.
pub struct Group<T, E> {
    calls: Arc<Mutex<HashMap<String, InFlight<T, E>>>>,
}

impl<T, E> Default for Group<T, E> {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T, E> Group<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `make()` unless an operation under `key` is already in flight, in
    /// which case join it. Every joiner gets a clone of the same result.
    ///
    /// `make` is only invoked by the caller that starts a new episode.
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let shared = {
            let mut calls = self.calls.lock().await;
            if let Some(existing) = calls.get(key) {
                tracing::trace!(target: "auth.token", key = %key, "Joining in-flight operation");
                existing.clone()
            } else {
                let registry = Arc::clone(&self.calls);
                let owned_key = key.to_string();
                let work = make();

                let handle = tokio::spawn(async move {
                    // A panic in `work` ends the inner task only, so the
                    // entry is removed on every outcome
                    let result = match tokio::spawn(work).await {
                        Ok(result) => result,
                        Err(join_err) => {
                            tracing::error!(target: "auth.token", key = %owned_key, error = %join_err, "In-flight operation failed to complete");
                            Err(E::from(join_err))
                        }
                    };
                    // Later callers start a new episode
                    registry.lock().await.remove(&owned_key);
                    result
                });

                let shared = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(join_err) => Err(E::from(join_err)),
                    }
                }
                .boxed()
                .shared();
                calls.insert(key.to_string(), shared.clone());
                shared
            }
        };

        shared.await
    }

    /// Whether an operation under `key` is currently in flight.
    pub async fn is_in_flight(&self, key: &str) -> bool {
        self.calls.lock().await.contains_key(key)
    }
}
