//! The key-value command contract a lock store must honor.

pub mod memory;

use std::future::Future;
use std::time::Duration;

use crate::error::LockResult;

pub use memory::MemoryStore;

// ============================================================================
// Lock Store Trait
// ============================================================================

/// A remote key-value store holding lock tokens with an expiry.
///
/// Implementations must give Redis-compatible semantics for each command.
/// Cross-process exclusion is exactly as strong as the store's consistency:
/// there is no quorum and no fencing token.
///
/// # Example
///
/// ```rust,ignore
/// let store = MemoryStore::new();
/// assert!(store.set_if_absent("res1", "token-a", Duration::from_secs(30)).await?);
/// assert!(!store.set_if_absent("res1", "token-b", Duration::from_secs(30)).await?);
/// assert!(store.delete_if_equals("res1", "token-a").await?);
/// ```
pub trait LockStore: Send + Sync + 'static {
    /// Short backend name used in tracing fields.
    fn backend(&self) -> &'static str;

    /// Sets `key = value` with `ttl`, only if `key` is absent.
    ///
    /// Maps to `SET key value NX PX ttl`. Returns `true` if the key was set.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Reads the current value of `key`.
    fn get(&self, key: &str) -> impl Future<Output = LockResult<Option<String>>> + Send;

    /// Deletes `key` only if its value equals `token`.
    ///
    /// Must be a single atomic operation on the store side. Returns `true` if
    /// the key was deleted.
    fn delete_if_equals(
        &self,
        key: &str,
        token: &str,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Refreshes the expiry of `key` to `ttl`, only if it currently exists.
    ///
    /// Never re-creates an expired key. Returns `true` if the expiry was set.
    fn expire_if_exists(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send;
}

impl<S: LockStore> LockStore for std::sync::Arc<S> {
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send {
        (**self).set_if_absent(key, value, ttl)
    }

    fn get(&self, key: &str) -> impl Future<Output = LockResult<Option<String>>> + Send {
        (**self).get(key)
    }

    fn delete_if_equals(
        &self,
        key: &str,
        token: &str,
    ) -> impl Future<Output = LockResult<bool>> + Send {
        (**self).delete_if_equals(key, token)
    }

    fn expire_if_exists(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send {
        (**self).expire_if_exists(key, ttl)
    }
}
