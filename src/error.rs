//! Error types for the cache and lock core
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Error Enum ==
/// Unified error type for caches, population policies and leases.
///
/// The enum is `Clone` so a single coalesced load result can be handed to
/// every waiting caller verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Key was never present or has already been removed
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Key was present but past its deadline at read time
    #[error("Key expired: {0}")]
    KeyExpired(String),

    /// The value was loaded but writing it into the cache failed
    #[error("Failed to refresh cache for key {key}: {reason}")]
    FailedToRefreshCache { key: String, reason: String },

    /// The store has been closed and no longer accepts writes
    #[error("Store is closed")]
    StoreClosed,

    /// Another holder owns the lease
    #[error("Failed to preempt lock: {0}")]
    FailedToPreemptLock(String),

    /// The caller is not the current owner of the lease
    #[error("Lock not held: {0}")]
    LockNotHeld(String),

    /// A remote call did not finish within its budget; the outcome is unknown
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Auto-refresh gave up after too many consecutive timeouts
    #[error("Refresh of lock {key} timed out {attempts} times in a row")]
    RefreshRetriesExhausted { key: String, attempts: u32 },

    /// The coordination service answered with something other than expected
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// A value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage or network failure reported by a backend
    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    /// True for the two "nothing usable in the cache" outcomes.
    pub fn is_miss(&self) -> bool {
        matches!(self, Error::KeyNotFound(_) | Error::KeyExpired(_))
    }

    /// True when a remote outcome is ambiguous and the caller may retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::DeadlineExceeded)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::DeadlineExceeded
    }
}

// == Result Type Alias ==
/// Convenience Result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;
