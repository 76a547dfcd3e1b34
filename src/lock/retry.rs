//! Retry strategies for lease acquisition and renewal.

use std::time::Duration;

/// Stateful retry policy.
///
/// Each call to [`next`](RetryStrategy::next) consumes one attempt and
/// returns how long to wait before it, or `None` once the budget is spent.
pub trait RetryStrategy: Send {
    fn next(&mut self) -> Option<Duration>;
}

// == Fixed Interval ==
/// Waits the same interval between attempts, up to `max_retries` times.
#[derive(Debug, Clone)]
pub struct FixedIntervalRetry {
    interval: Duration,
    max_retries: u32,
    attempts: u32,
}

impl FixedIntervalRetry {
    pub fn new(interval: Duration, max_retries: u32) -> Self {
        Self {
            interval,
            max_retries,
            attempts: 0,
        }
    }

    /// Retries with no pause in between.
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(Duration::ZERO, max_retries)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl RetryStrategy for FixedIntervalRetry {
    fn next(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_retries {
            return None;
        }
        self.attempts += 1;
        Some(self.interval)
    }
}

// == Exponential Backoff ==
/// Doubles the wait after every attempt, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoffRetry {
    next_wait: Duration,
    max: Duration,
    max_retries: u32,
    attempts: u32,
}

impl ExponentialBackoffRetry {
    pub fn new(initial: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            next_wait: initial.min(max),
            max,
            max_retries,
            attempts: 0,
        }
    }
}

impl RetryStrategy for ExponentialBackoffRetry {
    fn next(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_retries {
            return None;
        }
        self.attempts += 1;
        let wait = self.next_wait;
        self.next_wait = self.next_wait.saturating_mul(2).min(self.max);
        Some(wait)
    }
}
