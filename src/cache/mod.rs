//! Cache Module
//!
//! The common cache abstraction and its two storage implementations: an
//! in-process expiring store and an adapter over the coordination service.

mod entry;
mod remote;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

// Re-export public types
pub use entry::CacheEntry;
pub use remote::RemoteCache;
pub use stats::CacheStats;
pub use store::{EvictionCallback, ExpiringStore, StoreOptions};

pub(crate) use store::StoreCore;

// == Cache Trait ==
/// Key/value cache surface shared by stores and population policies.
///
/// A `ttl` of `Duration::ZERO` means the entry never expires.
#[async_trait]
pub trait Cache<V: Send + 'static>: Send + Sync {
    /// Returns the value, [`Error::KeyNotFound`](crate::Error::KeyNotFound)
    /// or [`Error::KeyExpired`](crate::Error::KeyExpired).
    async fn get(&self, key: &str) -> Result<V>;

    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl<V, C> Cache<V> for Arc<C>
where
    V: Send + 'static,
    C: Cache<V> + ?Sized,
{
    async fn get(&self, key: &str) -> Result<V> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }
}
