//! Lease renewal chains driven by the time wheel.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::store::LockStore;
use crate::time_wheel::{TaskHandle, TimeWheel};

/// Delay before the first renewal of a lease.
///
/// `max(cadence / 2, lease - 2 * cadence)`: late enough not to waste a round
/// trip, early enough that the lease has at least `2 * cadence` left.
pub fn first_renewal_delay(lease: Duration, cadence: Duration) -> Duration {
    (cadence / 2).max(lease.saturating_sub(cadence.saturating_mul(2)))
}

/// Time to live written by each renewal.
pub fn renewal_ttl(cadence: Duration) -> Duration {
    cadence.saturating_mul(2)
}

/// Returns `true` if a wheel ticking every `interval` renews a lease in time.
///
/// The wheel fires a delay `d` at most `d + interval` after scheduling. With
/// `cadence >= 2 * interval` the first renewal lands within `cadence` (before
/// any lease longer than `cadence` runs out) and every later one lands
/// within `1.5 * cadence`, short of the `2 * cadence` TTL it refreshes.
pub fn renews_in_time(cadence: Duration, interval: Duration) -> bool {
    cadence >= interval.saturating_mul(2)
}

struct RenewalChain<S> {
    store: Arc<S>,
    wheel: TimeWheel,
    key: String,
    cadence: Duration,
    handle: TaskHandle,
}

/// Starts a renewal chain for `key` and returns the handle that cancels it.
///
/// Each firing refreshes the key's expiry if it still exists, then re-arms
/// itself `cadence` later. A firing only re-arms after its own store call
/// completes, so firings for one key never overlap.
///
/// Returns `None` if the wheel has stopped and the chain could not be armed.
pub(crate) fn start<S: LockStore>(
    store: Arc<S>,
    wheel: &TimeWheel,
    key: &str,
    lease: Duration,
    cadence: Duration,
) -> Option<TaskHandle> {
    let handle = TaskHandle::default();
    let chain = Arc::new(RenewalChain {
        store,
        wheel: wheel.clone(),
        key: key.to_string(),
        cadence,
        handle: handle.clone(),
    });
    let delay = first_renewal_delay(lease, cadence);
    if !wheel.schedule_with(&handle, delay, renew(chain)) {
        return None;
    }
    debug!(lock.key = %key, first_renewal_ms = delay.as_millis() as u64, "watchdog armed");
    Some(handle)
}

fn renew<S: LockStore>(chain: Arc<RenewalChain<S>>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        if chain.handle.is_cancelled() {
            return;
        }

        let ttl = renewal_ttl(chain.cadence);
        match chain.store.expire_if_exists(&chain.key, ttl).await {
            Ok(true) => {
                debug!(lock.key = %chain.key, ttl_ms = ttl.as_millis() as u64, "lease renewed")
            }
            Ok(false) => warn!(lock.key = %chain.key, "lease no longer present in store"),
            Err(e) => warn!(lock.key = %chain.key, error = %e, "lease renewal failed"),
        }

        let next = renew(chain.clone());
        if !chain.wheel.schedule_with(&chain.handle, chain.cadence, next) {
            trace!(lock.key = %chain.key, "watchdog chain ended");
        }
    })
}
