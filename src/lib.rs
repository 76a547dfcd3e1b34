//! Mini Cachelock - caching and distributed coordination core
//!
//! An in-process expiring store, read-through and write-through population
//! policies with request coalescing, and a lease-based distributed lock over
//! a remote key/value coordination service.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lock;
pub mod policy;
mod tasks;

pub use cache::{Cache, ExpiringStore};
pub use config::Config;
pub use error::{Error, Result};
pub use lock::{Lock, LockClient};
