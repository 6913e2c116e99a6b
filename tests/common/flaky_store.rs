//! Store wrapper with failure injection for testing degraded paths.

use lease_lock_core::error::{LockError, LockResult};
use lease_lock_core::store::{LockStore, MemoryStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// A [`MemoryStore`] that can be switched into an "unavailable" state.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Arc<AtomicBool>,
    renewals: Arc<AtomicUsize>,
}

impl FlakyStore {
    /// Creates a healthy store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following command fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of expiry refreshes attempted.
    pub fn renewals(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }

    /// The wrapped store, for inspection.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self) -> LockResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(LockError::connection("store unavailable"))
        } else {
            Ok(())
        }
    }
}

impl LockStore for FlakyStore {
    fn backend(&self) -> &'static str {
        "flaky"
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        self.check()?;
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn delete_if_equals(&self, key: &str, token: &str) -> LockResult<bool> {
        self.check()?;
        self.inner.delete_if_equals(key, token).await
    }

    async fn expire_if_exists(&self, key: &str, ttl: Duration) -> LockResult<bool> {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.expire_if_exists(key, ttl).await
    }
}
