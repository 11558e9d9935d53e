//! Background refresh scheduler.
//!
//! A single task multiplexes two tickers. Each tick compares the clock with
//! the deadline the provider returned on the last refresh, so the provider
//! decides the cadence (hours for keys, minutes for tokens) without the
//! tickers being reconfigured.
//!
//! # Graceful Shutdown
//!
//! The scheduler exits when the instance's cancellation token fires, either
//! because the parent token was cancelled or because [`Auth::shutdown`] was
//! called. On exit it drops the error sender, so the error stream ends
//! exactly once.

use crate::auth::Auth;
use crate::errors::AuthError;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    NotStarted = 0,
    Running = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::NotStarted,
            1 => LifecycleState::Running,
            2 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Stopped,
        }
    }
}

/// Atomic holder for [`LifecycleState`].
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::NotStarted as u8))
    }

    pub(crate) fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: LifecycleState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; false if the current state is not `from`.
    pub(crate) fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Auth {
    /// Start the background scheduler.
    ///
    /// The first call spawns the scheduler and returns the error stream;
    /// every later call returns `None` and has no other effect. There is a
    /// single receiver and it goes to the first caller, so later callers
    /// cannot observe refresh errors.
    ///
    /// The stream must be drained: a full buffer stalls the scheduler until
    /// it is read or the instance shuts down. The stream ends when the
    /// scheduler stops.
    ///
    /// The first key refresh runs immediately inside the scheduler.
    pub fn start(self: &Arc<Self>) -> Option<mpsc::Receiver<AuthError>> {
        if !self
            .state
            .transition(LifecycleState::NotStarted, LifecycleState::Running)
        {
            tracing::debug!(target: "auth.lifecycle", state = ?self.state.get(), "Start ignored");
            return None;
        }

        let (tx, rx) = mpsc::channel(self.config().error_channel_capacity);
        tokio::spawn(run_scheduler(Arc::clone(self), tx, self.cancel.clone()));

        Some(rx)
    }

    /// Stop the background scheduler. Safe to call any number of times, and
    /// before [`Auth::start`].
    pub fn shutdown(&self) {
        if self
            .state
            .transition(LifecycleState::NotStarted, LifecycleState::Stopped)
        {
            info!(target: "auth.lifecycle", "Auth shut down before start");
        } else if self
            .state
            .transition(LifecycleState::Running, LifecycleState::ShuttingDown)
        {
            info!(target: "auth.lifecycle", "Auth shutdown requested");
        }
        self.cancel.cancel();
    }
}

/// Deliver an error unless the scheduler is being cancelled.
async fn report(errors: &mpsc::Sender<AuthError>, err: AuthError, cancel: &CancellationToken) {
    tokio::select! {
        sent = errors.send(err) => {
            if sent.is_err() {
                warn!(target: "auth.lifecycle", "Error stream receiver dropped, refresh error discarded");
            }
        }
        () = cancel.cancelled() => {}
    }
}

#[instrument(skip_all, name = "auth.lifecycle.scheduler")]
async fn run_scheduler(
    auth: Arc<Auth>,
    errors: mpsc::Sender<AuthError>,
    cancel: CancellationToken,
) {
    let tick = auth.config().refresh_tick;
    info!(
        target: "auth.lifecycle",
        tick_ms = u64::try_from(tick.as_millis()).unwrap_or(u64::MAX),
        "Starting auth refresh scheduler"
    );

    if let Err(e) = auth.refresh_keys().await {
        report(&errors, e, &cancel).await;
    }

    let first_tick = Instant::now() + tick;
    let mut token_ticker = tokio::time::interval_at(first_tick, tick);
    token_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut key_ticker = tokio::time::interval_at(first_tick, tick);
    key_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(target: "auth.lifecycle", "Auth scheduler received shutdown signal, exiting");
                break;
            }
            _ = token_ticker.tick() => {
                if auth.access_token_cache().refresh_due().await {
                    if let Err(e) = auth.refresh_access_token().await {
                        report(&errors, e, &cancel).await;
                    }
                }
            }
            _ = key_ticker.tick() => {
                if auth.keys().refresh_due().await {
                    if let Err(e) = auth.refresh_keys().await {
                        report(&errors, e, &cancel).await;
                    }
                }
            }
        }
    }

    auth.state.set(LifecycleState::ShuttingDown);
    drop(errors);
    auth.state.set(LifecycleState::Stopped);
    info!(target: "auth.lifecycle", "Auth scheduler stopped");
}
