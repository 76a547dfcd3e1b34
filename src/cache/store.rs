//! Cache Store Module
//!
//! Expiring in-process store: a HashMap behind a shared/exclusive lock, lazy
//! expiry on read and a bounded periodic sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::stats::StatsRecorder;
use crate::cache::{Cache, CacheEntry, CacheStats};
use crate::error::{Error, Result};
use crate::tasks::spawn_sweep_task;

/// Callback invoked with the key and value of every removed entry.
pub type EvictionCallback<V> = Arc<dyn Fn(&str, &V) + Send + Sync>;

// == Store Options ==
/// Construction parameters for [`ExpiringStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Interval between background sweeps
    pub sweep_interval: Duration,
    /// Maximum number of entries a single sweep may remove
    pub max_evictions_per_sweep: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            max_evictions_per_sweep: 1000,
        }
    }
}

impl StoreOptions {
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_max_evictions_per_sweep(mut self, max: usize) -> Self {
        self.max_evictions_per_sweep = max;
        self
    }
}

enum Lookup<V> {
    Absent,
    Expired,
    Live(V),
}

// == Store Core ==
/// State shared between the store handle and its sweep task.
pub(crate) struct StoreCore<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    on_evicted: Option<EvictionCallback<V>>,
    stats: StatsRecorder,
    closed: AtomicBool,
}

impl<V: Clone> StoreCore<V> {
    fn lookup(entries: &HashMap<String, CacheEntry<V>>, key: &str, now: Instant) -> Lookup<V> {
        match entries.get(key) {
            None => Lookup::Absent,
            Some(entry) if entry.is_expired_at(now) => Lookup::Expired,
            Some(entry) => Lookup::Live(entry.value.clone()),
        }
    }

    /// Removes `key` while the caller holds the write lock, firing the
    /// eviction callback if an entry was present.
    fn evict(&self, entries: &mut HashMap<String, CacheEntry<V>>, key: &str) -> bool {
        match entries.remove(key) {
            Some(entry) => {
                self.stats.record_eviction();
                if let Some(on_evicted) = &self.on_evicted {
                    on_evicted(key, &entry.value);
                }
                true
            }
            None => false,
        }
    }

    // == Sweep Expired ==
    /// Removes up to `limit` expired entries.
    ///
    /// Returns the number of entries removed.
    pub(crate) async fn sweep_expired(&self, limit: usize) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .take(limit)
            .collect();

        for key in &expired {
            self.evict(&mut *entries, key);
        }
        expired.len()
    }
}

// == Expiring Store ==
/// In-process key/value store whose entries expire after a per-entry TTL.
///
/// Must be created inside a tokio runtime: construction spawns the sweep task.
pub struct ExpiringStore<V> {
    core: Arc<StoreCore<V>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V> ExpiringStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a store and starts its background sweep.
    pub fn new(options: StoreOptions) -> Self {
        Self::build(options, None)
    }

    /// Creates a store that reports every removal to `on_evicted`.
    ///
    /// The callback runs under the store's exclusive lock and must not call
    /// back into the same store.
    pub fn with_eviction_callback<F>(options: StoreOptions, on_evicted: F) -> Self
    where
        F: Fn(&str, &V) + Send + Sync + 'static,
    {
        Self::build(options, Some(Arc::new(on_evicted)))
    }

    fn build(options: StoreOptions, on_evicted: Option<EvictionCallback<V>>) -> Self {
        let core = Arc::new(StoreCore {
            entries: RwLock::new(HashMap::new()),
            on_evicted,
            stats: StatsRecorder::default(),
            closed: AtomicBool::new(false),
        });
        let sweeper = spawn_sweep_task(Arc::downgrade(&core), options);
        Self {
            core,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    // == Set ==
    /// Stores a value, replacing any existing entry and its deadline.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - Time to live; `Duration::ZERO` means never expire
    pub async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<()> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(Error::StoreClosed);
        }
        let mut entries = self.core.entries.write().await;
        entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    // == Get ==
    /// Retrieves a live value by key.
    ///
    /// An entry found past its deadline is removed (firing the eviction
    /// callback once) and reported as [`Error::KeyExpired`].
    pub async fn get(&self, key: &str) -> Result<V> {
        let now = Instant::now();

        {
            let entries = self.core.entries.read().await;
            match StoreCore::lookup(&entries, key, now) {
                Lookup::Absent => {
                    self.core.stats.record_miss();
                    return Err(Error::KeyNotFound(key.to_string()));
                }
                Lookup::Live(value) => {
                    self.core.stats.record_hit();
                    return Ok(value);
                }
                Lookup::Expired => {}
            }
        }

        // Re-validate under the exclusive lock: a concurrent set may have
        // replaced the stale entry, or another reader may have removed it.
        let mut entries = self.core.entries.write().await;
        match StoreCore::lookup(&entries, key, now) {
            Lookup::Absent => {
                self.core.stats.record_miss();
                Err(Error::KeyNotFound(key.to_string()))
            }
            Lookup::Live(value) => {
                self.core.stats.record_hit();
                Ok(value)
            }
            Lookup::Expired => {
                self.core.evict(&mut *entries, key);
                self.core.stats.record_expiration();
                debug!(key = %key, "Removed expired entry on read");
                Err(Error::KeyExpired(key.to_string()))
            }
        }
    }

    // == Delete ==
    /// Removes an entry by key. Deleting an absent key is not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.core.entries.write().await;
        self.core.evict(&mut *entries, key);
        Ok(())
    }

    // == Stats ==
    /// Returns current store statistics.
    pub async fn stats(&self) -> CacheStats {
        let len = self.len().await;
        self.core.stats.snapshot(len)
    }

    // == Length ==
    /// Returns the number of physically present entries, expired or not.
    pub async fn len(&self) -> usize {
        self.core.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Runs a sweep immediately instead of waiting for the next tick.
    pub async fn sweep_now(&self, limit: usize) -> usize {
        self.core.sweep_expired(limit).await
    }

    // == Close ==
    /// Stops the sweep task and rejects further writes.
    ///
    /// Entries already in memory are kept and remain readable. Calling close
    /// more than once is a no-op.
    pub fn close(&self) {
        self.core.closed.store(true, Ordering::Release);
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("Expiring store closed, sweep task stopped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }
}

impl<V> Drop for ExpiringStore<V> {
    fn drop(&mut self) {
        let handle = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[async_trait]
impl<V> Cache<V> for ExpiringStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<V> {
        ExpiringStore::get(self, key).await
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<()> {
        ExpiringStore::set(self, key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        ExpiringStore::delete(self, key).await
    }
}
