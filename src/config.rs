//! Configuration Module
//!
//! Handles loading cache and lock settings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::StoreOptions;
use crate::lock::RefreshOptions;

/// Runtime configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval between background sweeps of the expiring store, in milliseconds
    pub sweep_interval_ms: u64,
    /// Upper bound on entries removed by a single sweep
    pub max_evictions_per_sweep: usize,
    /// Expiration applied when read-through populates the cache, in seconds
    pub default_ttl: u64,
    /// Lease duration in seconds
    pub lock_ttl: u64,
    /// Cadence of lease auto-refresh, in seconds
    pub refresh_interval: u64,
    /// Budget for a single refresh call, in milliseconds
    pub refresh_timeout_ms: u64,
    /// Consecutive refresh timeouts tolerated before giving up
    pub refresh_max_retries: u32,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SWEEP_INTERVAL_MS` - Sweep cadence (default: 1000)
    /// - `MAX_EVICTIONS_PER_SWEEP` - Sweep eviction bound (default: 1000)
    /// - `DEFAULT_TTL` - Read-through expiration in seconds (default: 300)
    /// - `LOCK_TTL` - Lease duration in seconds (default: 30)
    /// - `REFRESH_INTERVAL` - Auto-refresh cadence in seconds (default: 10)
    /// - `REFRESH_TIMEOUT_MS` - Per-refresh budget (default: 1000)
    /// - `REFRESH_MAX_RETRIES` - Timeout retry budget (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sweep_interval_ms: env_or("SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
            max_evictions_per_sweep: env_or(
                "MAX_EVICTIONS_PER_SWEEP",
                defaults.max_evictions_per_sweep,
            ),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            lock_ttl: env_or("LOCK_TTL", defaults.lock_ttl),
            refresh_interval: env_or("REFRESH_INTERVAL", defaults.refresh_interval),
            refresh_timeout_ms: env_or("REFRESH_TIMEOUT_MS", defaults.refresh_timeout_ms),
            refresh_max_retries: env_or("REFRESH_MAX_RETRIES", defaults.refresh_max_retries),
        }
    }

    /// Options for building an [`ExpiringStore`](crate::cache::ExpiringStore).
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            max_evictions_per_sweep: self.max_evictions_per_sweep,
        }
    }

    /// Options for a lease auto-refresh loop.
    pub fn refresh_options(&self) -> RefreshOptions {
        RefreshOptions {
            interval: Duration::from_secs(self.refresh_interval),
            timeout: Duration::from_millis(self.refresh_timeout_ms),
            max_retries: self.refresh_max_retries,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 1000,
            max_evictions_per_sweep: 1000,
            default_ttl: 300,
            lock_ttl: 30,
            refresh_interval: 10,
            refresh_timeout_ms: 1000,
            refresh_max_retries: 10,
        }
    }
}

fn env_or<T: FromStr>(name: &str, fallback: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}
