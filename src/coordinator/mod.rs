//! Coordination Service Module
//!
//! The client-side view of the remote key/value coordination service: an
//! atomic set-if-absent, atomic scripted check-and-act, and plain
//! get/set/delete for caching.

mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::InMemoryCoordinator;

// == Script ==
/// A named server-side script executed atomically by [`Coordinator::eval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Script {
    name: &'static str,
    body: &'static str,
}

impl Script {
    pub const fn new(name: &'static str, body: &'static str) -> Self {
        Self { name, body }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Script source as sent to the service.
    pub fn body(&self) -> &'static str {
        self.body
    }
}

// == Coordinator Trait ==
/// Remote key/value service used for leases and remote caching.
///
/// Implementations report transport failures as
/// [`Error::Backend`](crate::Error::Backend) and exhausted call budgets as
/// [`Error::DeadlineExceeded`](crate::Error::DeadlineExceeded).
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Sets `key` to `value` with `ttl` only if the key is absent.
    ///
    /// Returns whether the value was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Runs `script` atomically with the given keys and arguments and returns
    /// its scalar result.
    async fn eval(&self, script: &Script, keys: &[String], args: &[String]) -> Result<i64>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Unconditionally sets `key`; `Duration::ZERO` means no expiration.
    ///
    /// Returns the service's status reply, `"OK"` on success.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<String>;

    /// Deletes `key`, returning how many keys were removed.
    async fn delete(&self, key: &str) -> Result<u64>;
}

#[async_trait]
impl<T: Coordinator + ?Sized> Coordinator for Arc<T> {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        (**self).set_if_absent(key, value, ttl).await
    }

    async fn eval(&self, script: &Script, keys: &[String], args: &[String]) -> Result<i64> {
        (**self).eval(script, keys, args).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<String> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        (**self).delete(key).await
    }
}
