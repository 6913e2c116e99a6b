//! Convenience prelude for lease lock types.

pub use crate::error::{LockError, LockResult};
pub use crate::lock::{DistributedLock, DistributedLockBuilder, LockRequest};
pub use crate::ownership::LockOwner;
pub use crate::store::{LockStore, MemoryStore};
pub use crate::time_wheel::{TaskHandle, TimeWheel, TimeWheelConfig};
