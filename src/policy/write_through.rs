//! Write-through cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::cache::Cache;
use crate::error::Result;
use crate::policy::Storer;

// == Write Policy ==
/// Ordering between the backing-store write and the cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Store first; the cache is only written if the store succeeded
    #[default]
    StoreThenCache,
    /// Cache first; a store failure is returned after the cache was written
    CacheThenStore,
    /// Store synchronously, then write the cache on a detached task
    StoreThenDetachedCache,
    /// Return immediately; store then cache on a detached task
    Detached,
}

pub struct WriteThroughCache<V, C> {
    cache: Arc<C>,
    storer: Arc<dyn Storer<V>>,
    policy: WritePolicy,
}

impl<V, C> WriteThroughCache<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: Cache<V> + 'static,
{
    pub fn new(cache: Arc<C>, storer: impl Storer<V> + 'static, policy: WritePolicy) -> Self {
        Self {
            cache,
            storer: Arc::new(storer),
            policy,
        }
    }

    fn spawn_cache_write(&self, key: &str, value: V, ttl: Duration) {
        let cache = Arc::clone(&self.cache);
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(err) = cache.set(&key, value, ttl).await {
                error!(key = %key, error = %err, "Detached cache write failed");
            }
        });
    }

    fn spawn_store_then_cache(&self, key: &str, value: V, ttl: Duration) {
        let cache = Arc::clone(&self.cache);
        let storer = Arc::clone(&self.storer);
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(err) = storer.store(&key, &value).await {
                error!(key = %key, error = %err, "Detached store write failed");
                return;
            }
            if let Err(err) = cache.set(&key, value, ttl).await {
                error!(key = %key, error = %err, "Detached cache write failed");
            }
        });
    }
}

#[async_trait]
impl<V, C> Cache<V> for WriteThroughCache<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: Cache<V> + 'static,
{
    async fn get(&self, key: &str) -> Result<V> {
        self.cache.get(key).await
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<()> {
        debug!(key = %key, policy = ?self.policy, "Write-through set");
        match self.policy {
            WritePolicy::StoreThenCache => {
                self.storer.store(key, &value).await?;
                self.cache.set(key, value, ttl).await
            }
            WritePolicy::CacheThenStore => {
                self.cache.set(key, value.clone(), ttl).await?;
                self.storer.store(key, &value).await
            }
            WritePolicy::StoreThenDetachedCache => {
                self.storer.store(key, &value).await?;
                self.spawn_cache_write(key, value, ttl);
                Ok(())
            }
            WritePolicy::Detached => {
                self.spawn_store_then_cache(key, value, ttl);
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.delete(key).await
    }
}
