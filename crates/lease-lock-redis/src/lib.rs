//! Redis-compatible store for lease locks.

pub mod provider;
pub mod store;

pub use provider::{DEFAULT_PORT, RedisLockStoreBuilder};
pub use store::RedisLockStore;
