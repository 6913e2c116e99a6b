//! Process-local reentrancy bookkeeping.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::time_wheel::TaskHandle;

/// Opaque identity of a logical lock owner.
///
/// Supplied by the caller: a request id, a task id, a job name. Two calls
/// with equal owners are treated as the same holder for reentrancy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockOwner(Arc<str>);

impl LockOwner {
    /// Creates an owner from any string-like identity.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Returns the owner identity.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LockOwner {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for LockOwner {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl From<u64> for LockOwner {
    fn from(id: u64) -> Self {
        Self::new(id.to_string())
    }
}

/// Local record of a held key.
#[derive(Debug)]
pub(crate) struct Ownership {
    pub owner: LockOwner,
    pub count: u32,
    /// Token written to the store at acquisition.
    pub token: String,
    /// Renewal chain, if the lease is long enough to need one.
    pub watchdog: Option<TaskHandle>,
}

/// Outcome of checking the table before going to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reentry {
    /// No local record; the store must be asked.
    Vacant,
    /// Same owner; count incremented to the contained value.
    Reentered(u32),
    /// Held locally by another owner.
    Contended,
}

/// Outcome of a local release.
#[derive(Debug)]
pub(crate) enum Release {
    /// No record, or a record belonging to another owner.
    NotHeld,
    /// Count decremented but still positive.
    StillHeld(u32),
    /// Count reached zero; the record has been removed.
    Released(Ownership),
}

/// Per-key `(owner, count)` table guarded by one coarse mutex.
#[derive(Debug, Default)]
pub(crate) struct OwnershipTable {
    records: Mutex<HashMap<String, Ownership>>,
}

impl OwnershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the count if `owner` already holds `key`.
    pub fn reenter(&self, key: &str, owner: &LockOwner) -> Reentry {
        let mut records = self.records.lock();
        match records.get_mut(key) {
            None => Reentry::Vacant,
            Some(record) if &record.owner == owner => {
                record.count += 1;
                Reentry::Reentered(record.count)
            }
            Some(_) => Reentry::Contended,
        }
    }

    /// Records a fresh acquisition with count one.
    ///
    /// Returns the record it displaced, which only happens if the store
    /// granted a key this process still believed it held.
    pub fn insert(&self, key: &str, record: Ownership) -> Option<Ownership> {
        let mut records = self.records.lock();
        match records.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                None
            }
            Entry::Occupied(mut slot) => Some(slot.insert(record)),
        }
    }

    /// Decrements the count for `owner`, removing the record at zero.
    pub fn release(&self, key: &str, owner: &LockOwner) -> Release {
        let mut records = self.records.lock();
        let Entry::Occupied(mut slot) = records.entry(key.to_string()) else {
            return Release::NotHeld;
        };
        if &slot.get().owner != owner {
            return Release::NotHeld;
        }
        if slot.get().count > 1 {
            let record = slot.get_mut();
            record.count -= 1;
            return Release::StillHeld(record.count);
        }
        Release::Released(slot.remove())
    }

    /// Returns the count held by `owner` on `key`, zero if none.
    pub fn count(&self, key: &str, owner: &LockOwner) -> u32 {
        self.records
            .lock()
            .get(key)
            .filter(|record| &record.owner == owner)
            .map_or(0, |record| record.count)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.lock().contains_key(key)
    }

    /// Removes every record, returning them for cleanup.
    pub fn drain(&self) -> Vec<(String, Ownership)> {
        self.records.lock().drain().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }
}
