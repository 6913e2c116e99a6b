//! Reentrant lease locks over Redis, renewed by a time-wheel watchdog.
//!
//! A [`DistributedLock`] is a non-blocking try-lock keyed by string. It is
//! exclusive across processes through a conditional set on a Redis-compatible
//! store, reentrant per [`LockOwner`] inside one process, and keeps long
//! leases alive with a watchdog scheduled on a [`TimeWheel`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use lease_lock::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect to the store
//!     let store = RedisLockStore::builder()
//!         .host("localhost")
//!         .port(6379)
//!         .build()
//!         .await?;
//!
//!     // One lock object per process, shared by every caller
//!     let lock = DistributedLock::builder(store)
//!         .expiry(Duration::from_secs(30))
//!         .build()?;
//!
//!     let owner = LockOwner::from("job-7");
//!     if lock.lock("reports:daily", &owner).await {
//!         // Critical section - renewed in the background while held
//!         println!("Doing critical work...");
//!         lock.unlock("reports:daily", &owner).await;
//!     }
//!
//!     lock.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Leases
//!
//! - Leases longer than the extension cadence (10 s by default) are renewed
//!   every cadence, refreshing the store expiry to twice the cadence.
//! - Shorter leases are never renewed and expire on their own.
//! - A crashed process stops renewing; its keys expire after their TTL.
//!
//! # Crate Organization
//!
//! This is a meta-crate that re-exports types from:
//! - `lease-lock-core`: scheduler, store contract, lock and in-memory store
//! - `lease-lock-redis`: Redis store
//!
//! For fine-grained control, you can depend on individual crates instead.

// Re-export core types
pub use lease_lock_core::*;

// Re-export redis store
#[allow(ambiguous_glob_reexports)]
pub use lease_lock_redis::*;
