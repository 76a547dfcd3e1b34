//! Population Policies Module
//!
//! Cache wrappers that decide when the backing source is read or written:
//! read-through (with optional Bloom gate and request coalescing) and
//! write-through. Consistency variants are chosen at construction through
//! [`ReadPolicy`] and [`WritePolicy`].

pub mod bloom;
pub mod coalesce;
mod read_through;
mod write_through;

use std::future::Future;

use async_trait::async_trait;

use crate::error::Result;

pub use bloom::{BloomFilter, HashBloomFilter};
pub use coalesce::Group;
pub use read_through::{Fetched, ReadPolicy, ReadThroughCache, Source};
pub use write_through::{WritePolicy, WriteThroughCache};

// == Loader ==
/// Loads the authoritative value for a key on a cache miss.
#[async_trait]
pub trait Loader<V>: Send + Sync {
    async fn load(&self, key: &str) -> Result<V>;
}

/// [`Loader`] backed by an async closure.
pub struct FnLoader<F>(F);

/// Wraps `f(key)` as a [`Loader`].
pub fn loader_fn<F>(f: F) -> FnLoader<F> {
    FnLoader(f)
}

#[async_trait]
impl<V, F, Fut> Loader<V> for FnLoader<F>
where
    V: Send + 'static,
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<V>> + Send + 'static,
{
    async fn load(&self, key: &str) -> Result<V> {
        (self.0)(key.to_string()).await
    }
}

// == Storer ==
/// Persists a value to the backing store on a write-through.
#[async_trait]
pub trait Storer<V>: Send + Sync {
    async fn store(&self, key: &str, value: &V) -> Result<()>;
}

/// [`Storer`] backed by an async closure.
pub struct FnStorer<F>(F);

/// Wraps `f(key, value)` as a [`Storer`].
pub fn storer_fn<F>(f: F) -> FnStorer<F> {
    FnStorer(f)
}

#[async_trait]
impl<V, F, Fut> Storer<V> for FnStorer<F>
where
    V: Clone + Send + Sync + 'static,
    F: Fn(String, V) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn store(&self, key: &str, value: &V) -> Result<()> {
        (self.0)(key.to_string(), value.clone()).await
    }
}
