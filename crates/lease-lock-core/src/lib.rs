//! Core of the lease lock: time wheel scheduler, store contract, ownership
//! table and watchdog-renewed reentrant try-lock.

pub mod error;
pub mod lock;
pub mod ownership;
pub mod prelude;
pub mod store;
pub mod time_wheel;
pub mod token;
pub mod watchdog;

pub use error::{LockError, LockResult};
pub use prelude::*;
