//! Error types for lease lock operations.

use thiserror::Error;

/// Errors that can occur while configuring the lock or talking to the store.
///
/// The public `lock`/`unlock` operations never return these: a store failure
/// degrades to "lock not held". They surface from constructors and from the
/// [`LockStore`](crate::store::LockStore) methods themselves.
#[derive(Error, Debug)]
pub enum LockError {
    /// Store connection failed.
    #[error("connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Store-specific command failure.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Invalid scheduler, lock or store configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LockError {
    /// Wraps a backend failure described only by a message.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(Box::new(std::io::Error::other(message.into())))
    }

    /// Wraps a connection failure described only by a message.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(Box::new(std::io::Error::other(message.into())))
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;
