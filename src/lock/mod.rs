//! Distributed Lock Module
//!
//! Lease-based mutual exclusion over a remote [`Coordinator`](crate::coordinator::Coordinator).
//!
//! Exclusivity is enforced entirely by the service: acquisition is an atomic
//! set-if-absent with a fresh owner token, and release/renewal are atomic
//! compare-token-then-act scripts. No client-side lock is involved.
//!
//! ```text
//! try_lock() ──→ Held ── unlock() ──→ Released
//!                 │  ↺ refresh()
//!                 └── (expired / taken over) ──→ Lost
//! ```

mod client;
mod refresh;
mod retry;
pub mod scripts;

pub use client::{LeaseState, Lock, LockClient};
pub use refresh::{AutoRefresh, RefreshOptions};
pub use retry::{ExponentialBackoffRetry, FixedIntervalRetry, RetryStrategy};
