//! Read-through cache.
//!
//! On a miss the value is loaded from the backing source and written into
//! the wrapped cache. When and how that write happens is the [`ReadPolicy`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::policy::bloom::BloomFilter;
use crate::policy::coalesce::Group;
use crate::policy::Loader;

// == Read Policy ==
/// How a loaded value is written back into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Populate before returning; populate failures are reported
    #[default]
    Synchronous,
    /// Return immediately and populate on a detached task
    WriteAfterReturn,
    /// Populate before returning, with concurrent misses sharing one load
    Coalesced,
}

/// Where a fetched value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Loader,
}

/// Result of a read-through fetch.
///
/// `refresh_error` is set when the value was loaded but could not be written
/// into the cache; the value itself is still valid.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<V> {
    pub value: V,
    pub source: Source,
    pub refresh_error: Option<Error>,
}

impl<V> Fetched<V> {
    /// The value, or the populate failure if there was one.
    pub fn into_result(self) -> Result<V> {
        match self.refresh_error {
            Some(err) => Err(err),
            None => Ok(self.value),
        }
    }
}

// == Read-Through Cache ==
pub struct ReadThroughCache<V, C> {
    cache: Arc<C>,
    loader: Arc<dyn Loader<V>>,
    expiration: Duration,
    policy: ReadPolicy,
    bloom: Option<Arc<dyn BloomFilter>>,
    flights: Group<Result<Fetched<V>>>,
}

impl<V, C> ReadThroughCache<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: Cache<V> + 'static,
{
    /// Wraps `cache` so misses are filled from `loader`.
    ///
    /// # Arguments
    /// * `expiration` - TTL given to populated entries
    /// * `policy` - when the populate happens
    pub fn new(
        cache: Arc<C>,
        loader: impl Loader<V> + 'static,
        expiration: Duration,
        policy: ReadPolicy,
    ) -> Self {
        Self {
            cache,
            loader: Arc::new(loader),
            expiration,
            policy,
            bloom: None,
            flights: Group::new(),
        }
    }

    /// Gates loads behind `bloom`; keys it rejects never reach the loader.
    pub fn with_bloom_filter(mut self, bloom: Arc<dyn BloomFilter>) -> Self {
        self.bloom = Some(bloom);
        self
    }

    /// Returns the cached value, loading it on a miss.
    ///
    /// Loader errors and non-miss cache errors propagate unchanged. A key
    /// rejected by the Bloom gate yields [`Error::KeyNotFound`].
    pub async fn fetch(&self, key: &str) -> Result<Fetched<V>> {
        match self.cache.get(key).await {
            Ok(value) => {
                debug!(key = %key, "Read-through hit");
                return Ok(Fetched {
                    value,
                    source: Source::Cache,
                    refresh_error: None,
                });
            }
            Err(err) if err.is_miss() => debug!(key = %key, reason = %err, "Read-through miss"),
            Err(err) => return Err(err),
        }

        if let Some(bloom) = &self.bloom {
            if !bloom.has_key(key).await {
                debug!(key = %key, "Bloom filter rejected key");
                return Err(Error::KeyNotFound(key.to_string()));
            }
        }

        match self.policy {
            ReadPolicy::Synchronous => self.load_and_populate(key).await,
            ReadPolicy::WriteAfterReturn => {
                let value = self.loader.load(key).await?;
                self.populate_detached(key, value.clone());
                Ok(Fetched {
                    value,
                    source: Source::Loader,
                    refresh_error: None,
                })
            }
            ReadPolicy::Coalesced => {
                self.flights
                    .call(key, || self.load_and_populate(key))
                    .await
            }
        }
    }

    async fn load_and_populate(&self, key: &str) -> Result<Fetched<V>> {
        let value = self.loader.load(key).await?;
        let refresh_error = match self.cache.set(key, value.clone(), self.expiration).await {
            Ok(()) => None,
            Err(err) => {
                warn!(key = %key, error = %err, "Failed to populate cache after load");
                Some(Error::FailedToRefreshCache {
                    key: key.to_string(),
                    reason: err.to_string(),
                })
            }
        };
        Ok(Fetched {
            value,
            source: Source::Loader,
            refresh_error,
        })
    }

    fn populate_detached(&self, key: &str, value: V) {
        let cache = Arc::clone(&self.cache);
        let key = key.to_string();
        let ttl = self.expiration;
        tokio::spawn(async move {
            if let Err(err) = cache.set(&key, value, ttl).await {
                error!(key = %key, error = %err, "Detached cache populate failed");
            }
        });
    }
}

#[async_trait]
impl<V, C> Cache<V> for ReadThroughCache<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: Cache<V> + 'static,
{
    async fn get(&self, key: &str) -> Result<V> {
        self.fetch(key).await?.into_result()
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<()> {
        self.cache.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.delete(key).await
    }
}
