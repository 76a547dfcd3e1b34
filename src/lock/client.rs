//! Lease acquisition, release and renewal against the coordination service.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::lock::retry::RetryStrategy;
use crate::lock::scripts;

// == Lease State ==
/// Client-side view of a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    /// Acquired and not known to be lost
    Held,
    /// Released by this holder
    Released,
    /// The service reported the lease as no longer ours
    Lost,
}

impl LeaseState {
    fn as_u8(self) -> u8 {
        match self {
            LeaseState::Held => 0,
            LeaseState::Released => 1,
            LeaseState::Lost => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LeaseState::Held,
            1 => LeaseState::Released,
            _ => LeaseState::Lost,
        }
    }
}

// == Lock Client ==
/// Issues lease acquisitions against a [`Coordinator`].
#[derive(Clone)]
pub struct LockClient {
    coordinator: Arc<dyn Coordinator>,
}

impl LockClient {
    pub fn new(coordinator: Arc<dyn Coordinator>) -> Self {
        Self { coordinator }
    }

    // == Try Lock ==
    /// Makes a single attempt to take the lease on `key` for `ttl`.
    ///
    /// Returns [`Error::FailedToPreemptLock`] if another holder owns the key.
    /// Never blocks or retries; see [`lock`](Self::lock) for that.
    pub async fn try_lock(&self, key: &str, ttl: Duration) -> Result<Lock> {
        let token = Uuid::new_v4().to_string();
        self.acquire(key, token, ttl).await
    }

    async fn acquire(&self, key: &str, token: String, ttl: Duration) -> Result<Lock> {
        if self.coordinator.set_if_absent(key, &token, ttl).await? {
            info!(key = %key, ttl_ms = ttl.as_millis() as u64, "Lock acquired");
            return Ok(Lock::new(self.coordinator.clone(), key, token, ttl));
        }
        debug!(key = %key, "Lock held by another owner");
        Err(Error::FailedToPreemptLock(key.to_string()))
    }

    // == Lock ==
    /// Acquires the lease on `key`, retrying on contention and timeouts.
    ///
    /// Each attempt, including the read-back after a timed-out one, is
    /// bounded by `timeout`; between attempts the call waits as `retry`
    /// dictates. All attempts share one owner token, so a write
    /// that landed during a timed-out attempt is recognised as ours. Returns
    /// the last failure once the strategy gives up. Other service errors
    /// are returned immediately.
    pub async fn lock<R: RetryStrategy>(
        &self,
        key: &str,
        ttl: Duration,
        timeout: Duration,
        mut retry: R,
    ) -> Result<Lock> {
        let token = Uuid::new_v4().to_string();
        let mut ambiguous = false;

        loop {
            let attempt = tokio::time::timeout(timeout, self.acquire(key, token.clone(), ttl)).await;
            let failure = match attempt {
                Ok(Ok(lock)) => return Ok(lock),
                Ok(Err(Error::FailedToPreemptLock(_))) if ambiguous => {
                    match tokio::time::timeout(timeout, self.reclaim(key, &token, ttl)).await {
                        Ok(Ok(Some(lock))) => return Ok(lock),
                        // lapsed between the read-back and the renewal
                        Ok(Ok(None)) | Ok(Err(Error::LockNotHeld(_))) => {
                            Error::FailedToPreemptLock(key.to_string())
                        }
                        Ok(Err(Error::DeadlineExceeded)) | Err(_) => Error::DeadlineExceeded,
                        Ok(Err(err)) => return Err(err),
                    }
                }
                Ok(Err(err @ Error::FailedToPreemptLock(_))) => err,
                Ok(Err(Error::DeadlineExceeded)) | Err(_) => {
                    ambiguous = true;
                    Error::DeadlineExceeded
                }
                Ok(Err(err)) => return Err(err),
            };

            match retry.next() {
                Some(wait) => {
                    debug!(key = %key, wait_ms = wait.as_millis() as u64, "Retrying lock acquisition");
                    tokio::time::sleep(wait).await;
                }
                None => return Err(failure),
            }
        }
    }

    /// Checks whether an earlier timed-out attempt actually took the lease.
    async fn reclaim(&self, key: &str, token: &str, ttl: Duration) -> Result<Option<Lock>> {
        if self.coordinator.get(key).await?.as_deref() != Some(token) {
            return Ok(None);
        }
        let lock = Lock::new(self.coordinator.clone(), key, token.to_string(), ttl);
        lock.refresh().await?;
        info!(key = %key, "Lock acquired by an earlier timed-out attempt");
        Ok(Some(lock))
    }
}

// == Lock ==
/// A lease on a named resource, bound to a unique owner token.
///
/// Once released or lost, every further operation fails with
/// [`Error::LockNotHeld`].
pub struct Lock {
    pub(super) inner: Arc<LeaseInner>,
}

pub(super) struct LeaseInner {
    coordinator: Arc<dyn Coordinator>,
    key: String,
    token: String,
    ttl: Duration,
    acquired_at: DateTime<Utc>,
    state: AtomicU8,
}

impl Lock {
    fn new(coordinator: Arc<dyn Coordinator>, key: &str, token: String, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(LeaseInner {
                coordinator,
                key: key.to_string(),
                token,
                ttl,
                acquired_at: Utc::now(),
                state: AtomicU8::new(LeaseState::Held.as_u8()),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The owner token proving this holder's claim.
    pub fn token(&self) -> &str {
        &self.inner.token
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.inner.acquired_at
    }

    pub fn state(&self) -> LeaseState {
        LeaseState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub(super) fn handle(&self) -> Lock {
        Lock {
            inner: self.inner.clone(),
        }
    }

    fn transition(&self, to: LeaseState) {
        let _ = self.inner.state.compare_exchange(
            LeaseState::Held.as_u8(),
            to.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn ensure_held(&self) -> Result<()> {
        match self.state() {
            LeaseState::Held => Ok(()),
            _ => Err(Error::LockNotHeld(self.inner.key.clone())),
        }
    }

    fn not_held(&self) -> Error {
        self.transition(LeaseState::Lost);
        if self.state() == LeaseState::Lost {
            warn!(key = %self.inner.key, "Lock is no longer held by this owner");
        }
        Error::LockNotHeld(self.inner.key.clone())
    }

    // == Unlock ==
    /// Releases the lease if, and only if, the service still holds our token.
    pub async fn unlock(&self) -> Result<()> {
        self.ensure_held()?;
        let released = self
            .inner
            .coordinator
            .eval(
                &scripts::UNLOCK,
                &[self.inner.key.clone()],
                &[self.inner.token.clone()],
            )
            .await?;

        if released == 1 {
            self.transition(LeaseState::Released);
            info!(key = %self.inner.key, "Lock released");
            Ok(())
        } else {
            Err(self.not_held())
        }
    }

    // == Refresh ==
    /// Extends the lease back to its full ttl if we are still the owner.
    pub async fn refresh(&self) -> Result<()> {
        self.ensure_held()?;
        let extended = self
            .inner
            .coordinator
            .eval(
                &scripts::REFRESH,
                &[self.inner.key.clone()],
                &[self.inner.token.clone(), self.inner.ttl.as_millis().to_string()],
            )
            .await?;

        if extended == 1 {
            debug!(key = %self.inner.key, "Lock refreshed");
            Ok(())
        } else {
            Err(self.not_held())
        }
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("key", &self.inner.key)
            .field("token", &self.inner.token)
            .field("ttl", &self.inner.ttl)
            .field("acquired_at", &self.inner.acquired_at)
            .field("state", &self.state())
            .finish()
    }
}
