//! Lease auto-refresh loop.
//!
//! The loop renews a lease on a fixed cadence. A renewal that times out is
//! ambiguous (it may or may not have landed), so it is retried right away
//! instead of waiting for the next tick; a definitive loss of ownership ends
//! the loop immediately.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::lock::client::{LeaseState, Lock};
use crate::lock::retry::{FixedIntervalRetry, RetryStrategy};

// == Refresh Options ==
/// Cadence and timeout budget of an auto-refresh loop.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Time between renewals
    pub interval: Duration,
    /// Budget for a single renewal call
    pub timeout: Duration,
    /// Consecutive timeouts tolerated before the loop gives up
    pub max_retries: u32,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(1),
            max_retries: 10,
        }
    }
}

impl Lock {
    // == Auto Refresh ==
    /// Renews the lease every `options.interval` until it fails.
    ///
    /// Returns `Ok(())` once the lease is released by this holder. Returns
    /// [`Error::LockNotHeld`] as soon as ownership is lost, and
    /// [`Error::RefreshRetriesExhausted`] once more than `options.max_retries`
    /// renewals in a row time out. Dropping the future cancels the loop along
    /// with any renewal in flight.
    pub async fn auto_refresh(&self, options: RefreshOptions) -> Result<()> {
        self.auto_refresh_with(
            options.interval,
            options.timeout,
            FixedIntervalRetry::immediate(options.max_retries),
        )
        .await
    }

    /// Same as [`auto_refresh`](Self::auto_refresh) with a custom pacing for
    /// timeout retries. `retry` is cloned fresh for every tick, so the budget
    /// counts consecutive timeouts only.
    pub async fn auto_refresh_with<R>(&self, interval: Duration, timeout: Duration, retry: R) -> Result<()>
    where
        R: RetryStrategy + Clone,
    {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            key = %self.key(),
            interval_ms = interval.as_millis() as u64,
            timeout_ms = timeout.as_millis() as u64,
            "Lock auto-refresh started"
        );

        loop {
            ticker.tick().await;
            match self.state() {
                LeaseState::Held => {}
                LeaseState::Released => {
                    info!(key = %self.key(), "Lock released, auto-refresh finished");
                    return Ok(());
                }
                LeaseState::Lost => return Err(Error::LockNotHeld(self.key().to_string())),
            }

            let mut strategy = retry.clone();
            let mut attempts = 0u32;
            loop {
                attempts += 1;
                let outcome = match tokio::time::timeout(timeout, self.refresh()).await {
                    Ok(result) => result,
                    Err(elapsed) => Err(elapsed.into()),
                };
                match outcome {
                    Ok(()) => break,
                    Err(err) if err.is_timeout() => {
                        warn!(key = %self.key(), attempts, "Lock refresh timed out");
                        match strategy.next() {
                            Some(wait) if wait.is_zero() => {}
                            Some(wait) => tokio::time::sleep(wait).await,
                            None => {
                                error!(
                                    key = %self.key(),
                                    attempts,
                                    "Giving up on lock refresh after repeated timeouts"
                                );
                                return Err(Error::RefreshRetriesExhausted {
                                    key: self.key().to_string(),
                                    attempts,
                                });
                            }
                        }
                    }
                    // unlocked while a renewal was in flight
                    Err(Error::LockNotHeld(_)) if self.state() == LeaseState::Released => {
                        info!(key = %self.key(), "Lock released, auto-refresh finished");
                        return Ok(());
                    }
                    Err(err) => {
                        warn!(key = %self.key(), error = %err, "Lock auto-refresh stopped");
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Runs [`auto_refresh`](Self::auto_refresh) on its own task.
    ///
    /// The returned handle reports a terminal failure through
    /// [`AutoRefresh::failed`] and stops the loop on [`AutoRefresh::stop`] or
    /// when dropped.
    pub fn spawn_auto_refresh(&self, options: RefreshOptions) -> AutoRefresh {
        let lock = self.handle();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            tokio::select! {
                result = lock.auto_refresh(options) => result,
                _ = stop_rx => Ok(()),
            }
        });

        AutoRefresh {
            key: self.key().to_string(),
            stop: Some(stop_tx),
            task: Some(task),
            outcome: None,
        }
    }
}

// == Auto Refresh Handle ==
/// Handle to a spawned auto-refresh loop.
pub struct AutoRefresh {
    key: String,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<()>>>,
    outcome: Option<Result<()>>,
}

impl AutoRefresh {
    /// Resolves when the loop exits, with its terminal result.
    ///
    /// Cancel-safe, so it can sit in a `select!` next to the critical section
    /// and abort it on `Err`.
    pub async fn failed(&mut self) -> Result<()> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let outcome = match task.await {
            Ok(result) => result,
            Err(join_err) => Err(Error::Backend(format!(
                "auto-refresh task for {} failed: {join_err}",
                self.key
            ))),
        };
        self.task = None;
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// True once the loop has exited for any reason.
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some() || self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the loop without waiting on a renewal in flight.
    ///
    /// Returns the loop's error if it had already failed before the stop.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let outcome = self.failed().await;
        info!(key = %self.key, "Lock auto-refresh stopped");
        outcome
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
