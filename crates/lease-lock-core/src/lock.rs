//! Reentrant try-lock over a [`LockStore`], renewed by a watchdog.

use std::sync::Arc;
use std::time::Duration;

use tracing::{Span, debug, instrument, warn};

use crate::error::{LockError, LockResult};
use crate::ownership::{LockOwner, Ownership, OwnershipTable, Reentry, Release};
use crate::store::LockStore;
use crate::time_wheel::{TimeWheel, TimeWheelConfig};
use crate::token::create_session_token;
use crate::watchdog;

/// Default lease written on acquisition.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(30);

/// Default renewal threshold and watchdog cadence.
pub const DEFAULT_EXTENSION_CADENCE: Duration = Duration::from_secs(10);

/// Per-call overrides for [`DistributedLock::lock_with`].
#[derive(Debug, Clone, Default)]
pub struct LockRequest {
    /// Token stored in the key. Defaults to the lock's session token.
    pub token: Option<String>,
    /// Lease length. Defaults to the lock's expiry.
    pub lease: Option<Duration>,
}

impl LockRequest {
    /// Creates a request using every default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the token written to the store.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the lease length.
    pub fn lease(mut self, lease: Duration) -> Self {
        self.lease = Some(lease);
        self
    }
}

/// Builder for [`DistributedLock`].
pub struct DistributedLockBuilder<S> {
    store: S,
    expiry: Duration,
    extension_cadence: Duration,
    token: Option<String>,
    scheduler: Option<TimeWheel>,
    time_wheel_config: TimeWheelConfig,
}

impl<S: LockStore> DistributedLockBuilder<S> {
    /// Creates a builder with default settings.
    pub fn new(store: S) -> Self {
        Self {
            store,
            expiry: DEFAULT_EXPIRY,
            extension_cadence: DEFAULT_EXTENSION_CADENCE,
            token: None,
            scheduler: None,
            time_wheel_config: TimeWheelConfig::default(),
        }
    }

    /// Sets the default lease length.
    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Sets the renewal threshold.
    ///
    /// Leases longer than this get a watchdog that renews them every
    /// `cadence`, refreshing the expiry to `2 * cadence`.
    pub fn extension_cadence(mut self, cadence: Duration) -> Self {
        self.extension_cadence = cadence;
        self
    }

    /// Sets the default token written to the store.
    ///
    /// Defaults to a token unique to this lock instance.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Uses an existing scheduler instead of starting one.
    ///
    /// The lock will not stop a scheduler it did not start.
    pub fn scheduler(mut self, scheduler: TimeWheel) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Sets the configuration of the scheduler started by [`build`](Self::build).
    pub fn time_wheel_config(mut self, config: TimeWheelConfig) -> Self {
        self.time_wheel_config = config;
        self
    }

    /// Builds the lock, starting its scheduler if none was supplied.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidConfig`] for a zero expiry, a zero cadence,
    /// a cadence shorter than two scheduler ticks or an invalid scheduler
    /// configuration.
    pub fn build(self) -> LockResult<DistributedLock<S>> {
        if self.expiry.is_zero() {
            return Err(LockError::InvalidConfig("expiry must be non-zero".to_string()));
        }
        if self.extension_cadence.is_zero() {
            return Err(LockError::InvalidConfig(
                "extension cadence must be non-zero".to_string(),
            ));
        }

        let interval = self
            .scheduler
            .as_ref()
            .map_or(self.time_wheel_config.interval, |scheduler| scheduler.config().interval);
        if !watchdog::renews_in_time(self.extension_cadence, interval) {
            return Err(LockError::InvalidConfig(format!(
                "extension cadence {:?} must be at least twice the scheduler interval {:?}",
                self.extension_cadence, interval
            )));
        }

        let (scheduler, owns_scheduler) = match self.scheduler {
            Some(scheduler) => (scheduler, false),
            None => (TimeWheel::start(self.time_wheel_config)?, true),
        };

        Ok(DistributedLock {
            store: Arc::new(self.store),
            scheduler,
            owns_scheduler,
            table: OwnershipTable::new(),
            expiry: self.expiry,
            extension_cadence: self.extension_cadence,
            token: self.token.unwrap_or_else(create_session_token),
        })
    }
}

/// A cross-process try-lock keyed by string.
///
/// Acquisition never waits: a key held by another owner, in this process or
/// elsewhere, fails immediately. The same [`LockOwner`] may re-acquire a key
/// it holds; the store key is deleted after as many unlocks as locks.
///
/// Leases longer than the extension cadence are renewed in the background
/// until fully released. Shorter leases simply expire.
///
/// Store failures never surface from `lock`/`unlock`: they degrade to "not
/// acquired" or to a key that lingers until its lease runs out.
///
/// # Example
///
/// ```rust,ignore
/// let lock = DistributedLock::new(MemoryStore::new())?;
/// let owner = LockOwner::from("request-42");
///
/// if lock.lock("orders:17", &owner).await {
///     // critical section
///     lock.unlock("orders:17", &owner).await;
/// }
/// ```
#[derive(Debug)]
pub struct DistributedLock<S: LockStore> {
    store: Arc<S>,
    scheduler: TimeWheel,
    owns_scheduler: bool,
    table: OwnershipTable,
    expiry: Duration,
    extension_cadence: Duration,
    token: String,
}

impl<S: LockStore> DistributedLock<S> {
    /// Returns a new builder for configuring the lock.
    pub fn builder(store: S) -> DistributedLockBuilder<S> {
        DistributedLockBuilder::new(store)
    }

    /// Creates a lock with default settings and its own scheduler.
    pub fn new(store: S) -> LockResult<Self> {
        Self::builder(store).build()
    }

    /// Acquires `key` for `owner` with the default token and lease.
    pub async fn lock(&self, key: &str, owner: &LockOwner) -> bool {
        self.lock_with(key, owner, LockRequest::default()).await
    }

    /// Acquires `key` for `owner`, returning `false` if it is held elsewhere.
    ///
    /// A lease longer than the extension cadence needs a watchdog, so it is
    /// refused once the scheduler has stopped.
    #[instrument(
        skip(self, request),
        fields(
            lock.key = %key,
            owner = %owner,
            backend = self.store.backend(),
            acquired = tracing::field::Empty
        )
    )]
    pub async fn lock_with(&self, key: &str, owner: &LockOwner, request: LockRequest) -> bool {
        match self.table.reenter(key, owner) {
            Reentry::Reentered(count) => {
                Span::current().record("acquired", true);
                debug!(count, "reentrant acquisition");
                return true;
            }
            Reentry::Contended => {
                Span::current().record("acquired", false);
                debug!("held locally by another owner");
                return false;
            }
            Reentry::Vacant => {}
        }

        let token = request.token.unwrap_or_else(|| self.token.clone());
        let lease = request.lease.unwrap_or(self.expiry);
        if lease.is_zero() {
            warn!("zero lease rejected");
            Span::current().record("acquired", false);
            return false;
        }
        let needs_watchdog = lease > self.extension_cadence;
        if needs_watchdog && self.scheduler.is_stopped() {
            warn!("scheduler stopped, lease cannot be renewed");
            Span::current().record("acquired", false);
            return false;
        }

        match self.store.set_if_absent(key, &token, lease).await {
            Ok(true) => {}
            Ok(false) => {
                // The same owner may have won the key from another task meanwhile.
                let reentered = matches!(self.table.reenter(key, owner), Reentry::Reentered(_));
                Span::current().record("acquired", reentered);
                debug!(reentered, "key held in store");
                return reentered;
            }
            Err(e) => {
                Span::current().record("acquired", false);
                warn!(error = %e, "store unavailable, lock not acquired");
                return false;
            }
        }

        let watchdog = if needs_watchdog {
            let started = watchdog::start(
                self.store.clone(),
                &self.scheduler,
                key,
                lease,
                self.extension_cadence,
            );
            if started.is_none() {
                // Stopped between the check above and the set.
                warn!("scheduler stopped, releasing unrenewable lease");
                if let Err(e) = self.store.delete_if_equals(key, &token).await {
                    warn!(error = %e, "store unavailable, key will expire with its lease");
                }
                Span::current().record("acquired", false);
                return false;
            }
            started
        } else {
            None
        };

        let record = Ownership {
            owner: owner.clone(),
            count: 1,
            token,
            watchdog,
        };
        if let Some(stale) = self.table.insert(key, record) {
            warn!(stale.owner = %stale.owner, "replaced stale local record");
            if let Some(handle) = stale.watchdog {
                handle.cancel();
            }
        }

        Span::current().record("acquired", true);
        debug!(lease_ms = lease.as_millis() as u64, "lock acquired");
        true
    }

    /// Releases one level of `owner`'s hold on `key`.
    ///
    /// At the last level the watchdog is cancelled and the store key is
    /// deleted if it still carries the token written at acquisition.
    pub async fn unlock(&self, key: &str, owner: &LockOwner) {
        self.release(key, owner, None).await
    }

    /// Like [`unlock`](Self::unlock), comparing the store key against `token`.
    pub async fn unlock_with(&self, key: &str, owner: &LockOwner, token: &str) {
        self.release(key, owner, Some(token)).await
    }

    #[instrument(
        skip(self, token),
        fields(lock.key = %key, owner = %owner, backend = self.store.backend())
    )]
    async fn release(&self, key: &str, owner: &LockOwner, token: Option<&str>) {
        let record = match self.table.release(key, owner) {
            Release::NotHeld => {
                debug!("not held by this owner, ignoring");
                return;
            }
            Release::StillHeld(count) => {
                debug!(count, "reentrant release");
                return;
            }
            Release::Released(record) => record,
        };

        if let Some(handle) = &record.watchdog {
            handle.cancel();
        }

        let token = token.unwrap_or(record.token.as_str());
        match self.store.delete_if_equals(key, token).await {
            Ok(true) => debug!("lock released"),
            Ok(false) => warn!("store key expired or taken by another holder before release"),
            Err(e) => warn!(error = %e, "store unavailable, key will expire with its lease"),
        }
    }

    /// Returns how many times `owner` currently holds `key` in this process.
    pub fn hold_count(&self, key: &str, owner: &LockOwner) -> u32 {
        self.table.count(key, owner)
    }

    /// Returns `true` if any owner in this process holds `key`.
    pub fn is_held_locally(&self, key: &str) -> bool {
        self.table.contains(key)
    }

    /// Number of keys held in this process.
    pub fn held_keys(&self) -> usize {
        self.table.len()
    }

    /// Releases every key held in this process and stops an owned scheduler.
    ///
    /// Intended for graceful shutdown; reentrancy counts are ignored.
    pub async fn shutdown(&self) {
        for (key, record) in self.table.drain() {
            if let Some(handle) = &record.watchdog {
                handle.cancel();
            }
            if let Err(e) = self.store.delete_if_equals(&key, &record.token).await {
                warn!(lock.key = %key, error = %e, "release during shutdown failed");
            }
        }
        if self.owns_scheduler {
            self.scheduler.stop();
        }
    }

    /// Default token written to the store.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Default lease length.
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Renewal threshold and watchdog cadence.
    pub fn extension_cadence(&self) -> Duration {
        self.extension_cadence
    }

    /// Scheduler driving the watchdogs.
    pub fn scheduler(&self) -> &TimeWheel {
        &self.scheduler
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: LockStore> Drop for DistributedLock<S> {
    fn drop(&mut self) {
        // Keys are not deleted here; without renewal they expire with their lease.
        for (_, record) in self.table.drain() {
            if let Some(handle) = record.watchdog {
                handle.cancel();
            }
        }
        if self.owns_scheduler {
            self.scheduler.stop();
        }
    }
}
