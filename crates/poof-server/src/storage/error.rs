//! Storage error types.
//!
//! Defines errors that can occur during store operations:
//! - `AtCapacity`: the store refuses new secrets until some burn or expire
//! - `Closed`: the store has been shut down
//! - `Serialization`/`Corrupt`: persisted data could not be decoded
//! - `Io`: underlying storage system errors
//!
//! A miss on `get` is not an error; it is `Ok(None)`.

use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store holds its configured maximum number of secrets.
    ///
    /// Recoverable: the caller may retry once secrets burn or expire.
    #[error("store at capacity ({capacity} secrets)")]
    AtCapacity {
        /// Configured maximum number of live secrets
        capacity: u64,
    },

    /// Store was closed and no longer accepts operations
    #[error("store is closed")]
    Closed,

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Persisted metadata is unreadable (e.g. a damaged seed)
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// A thread panicked while holding the store lock
    #[error("store lock poisoned")]
    Poisoned,

    /// No Tokio runtime available to drive timers
    #[error("runtime unavailable: {0}")]
    Runtime(String),

    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}
