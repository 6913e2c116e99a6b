//! Hashed time wheel driving delayed and recurring tasks.
//!
//! One tokio task ticks the wheel every `interval`. Each tick drains the
//! bucket under the cursor, spawns every due task independently, then
//! advances the cursor. A task with delay `d` lands in bucket
//! `(cursor + d / interval) % wheel_size` and carries the number of full
//! rotations it must wait, so delays longer than one rotation fire on time.

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, trace};

use crate::error::{LockError, LockResult};

/// Default tick period.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of buckets (one rotation = 60 s at the default interval).
pub const DEFAULT_WHEEL_SIZE: usize = 600;

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Time wheel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWheelConfig {
    /// Tick period.
    pub interval: Duration,
    /// Number of buckets.
    pub wheel_size: usize,
}

impl TimeWheelConfig {
    /// Creates a configuration with the given tick period and bucket count.
    pub fn new(interval: Duration, wheel_size: usize) -> Self {
        Self {
            interval,
            wheel_size,
        }
    }

    /// Time covered by one full rotation of the wheel.
    pub fn rotation(&self) -> Duration {
        self.interval.saturating_mul(u32::try_from(self.wheel_size).unwrap_or(u32::MAX))
    }

    fn validate(&self) -> LockResult<()> {
        if self.interval.is_zero() {
            return Err(LockError::InvalidConfig(
                "time wheel interval must be non-zero".to_string(),
            ));
        }
        if self.wheel_size == 0 {
            return Err(LockError::InvalidConfig(
                "time wheel size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TimeWheelConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, DEFAULT_WHEEL_SIZE)
    }
}

// ============================================================================
// Task Handle
// ============================================================================

/// Cancellation handle for a scheduled task.
///
/// Cancelling is race-free with respect to the tick loop: the flag is checked
/// when the bucket is drained, before the task is spawned. A task that is
/// already running is not interrupted.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    fn new() -> Self {
        Self::default()
    }

    fn cancelled() -> Self {
        let handle = Self::new();
        handle.cancel();
        handle
    }

    /// Cancels the task and every task later re-armed under this handle.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

// ============================================================================
// Wheel State
// ============================================================================

struct Entry {
    rounds: usize,
    handle: TaskHandle,
    task: Task,
}

struct Wheel {
    cursor: usize,
    buckets: Vec<Vec<Entry>>,
}

impl Wheel {
    fn new(size: usize) -> Self {
        Self {
            cursor: 0,
            buckets: (0..size).map(|_| Vec::new()).collect(),
        }
    }

    /// Bucket index and remaining rotations for a task `ticks` ahead.
    fn slot(&self, ticks: usize) -> (usize, usize) {
        let size = self.buckets.len();
        ((self.cursor + ticks % size) % size, ticks / size)
    }

    /// Drains the bucket under the cursor and advances the cursor.
    ///
    /// Entries that still owe rotations go back into the bucket; cancelled
    /// entries are dropped.
    fn advance(&mut self) -> Vec<Task> {
        let size = self.buckets.len();
        let bucket = mem::take(&mut self.buckets[self.cursor]);
        let mut due = Vec::new();
        for mut entry in bucket {
            if entry.handle.is_cancelled() {
                continue;
            }
            if entry.rounds == 0 {
                due.push(entry.task);
            } else {
                entry.rounds -= 1;
                self.buckets[self.cursor].push(entry);
            }
        }
        self.cursor = (self.cursor + 1) % size;
        due
    }

    fn pending(&self) -> usize {
        self.buckets
            .iter()
            .flatten()
            .filter(|entry| !entry.handle.is_cancelled())
            .count()
    }

    fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }
}

struct Shared {
    config: TimeWheelConfig,
    wheel: Mutex<Wheel>,
    stop: watch::Sender<bool>,
}

// ============================================================================
// Time Wheel
// ============================================================================

/// A time wheel scheduler with a single background tick loop.
///
/// Cloning yields another handle to the same wheel. The tick loop runs until
/// [`stop`](Self::stop) is called; dropping handles does not stop it.
///
/// # Example
///
/// ```rust,ignore
/// let wheel = TimeWheel::start(TimeWheelConfig::default())?;
/// let handle = wheel.schedule(Duration::from_millis(250), async {
///     println!("fired");
/// });
/// handle.cancel();
/// wheel.stop();
/// ```
#[derive(Clone)]
pub struct TimeWheel {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TimeWheel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeWheel")
            .field("config", &self.shared.config)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl TimeWheel {
    /// Starts a wheel and spawns its tick loop on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidConfig`] for a zero interval or size.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(config: TimeWheelConfig) -> LockResult<Self> {
        config.validate()?;

        let (stop, stop_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            config,
            wheel: Mutex::new(Wheel::new(config.wheel_size)),
            stop,
        });
        tokio::spawn(run(shared.clone(), stop_rx));
        debug!(
            interval_ms = config.interval.as_millis() as u64,
            wheel_size = config.wheel_size,
            "time wheel started"
        );

        Ok(Self { shared })
    }

    /// Returns the wheel configuration.
    pub fn config(&self) -> TimeWheelConfig {
        self.shared.config
    }

    /// Schedules `task` to run after `delay`.
    ///
    /// The delay is rounded down to whole ticks.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_stopped() {
            trace!("schedule after stop ignored");
            return TaskHandle::cancelled();
        }
        let handle = TaskHandle::new();
        self.insert(handle.clone(), delay, Box::pin(task));
        handle
    }

    /// Schedules `task` under an existing handle.
    ///
    /// Lets a recurring task re-arm itself so that one handle cancels the
    /// whole chain. Returns `false` without scheduling anything if the handle
    /// is already cancelled or the wheel has stopped.
    pub fn schedule_with<F>(&self, handle: &TaskHandle, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if handle.is_cancelled() || self.is_stopped() {
            return false;
        }
        self.insert(handle.clone(), delay, Box::pin(task));
        true
    }

    fn insert(&self, handle: TaskHandle, delay: Duration, task: Task) {
        let ticks = (delay.as_nanos() / self.shared.config.interval.as_nanos())
            .try_into()
            .unwrap_or(usize::MAX);
        let mut wheel = self.shared.wheel.lock();
        let (bucket, rounds) = wheel.slot(ticks);
        wheel.buckets[bucket].push(Entry {
            rounds,
            handle,
            task,
        });
    }

    /// Number of scheduled tasks not yet dispatched or cancelled.
    pub fn pending(&self) -> usize {
        self.shared.wheel.lock().pending()
    }

    /// Current cursor position.
    pub fn cursor(&self) -> usize {
        self.shared.wheel.lock().cursor
    }

    /// Signals the tick loop to exit. Idempotent.
    ///
    /// Pending tasks are dropped; tasks already running are left to finish.
    pub fn stop(&self) {
        if !self.shared.stop.send_replace(true) {
            debug!("time wheel stopping");
        }
    }

    /// Returns `true` once [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        *self.shared.stop.borrow()
    }
}

async fn run(shared: Arc<Shared>, mut stop_rx: watch::Receiver<bool>) {
    let period = shared.config.interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    let mut in_flight: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                report(result);
            }
            _ = ticker.tick() => {
                let due = shared.wheel.lock().advance();
                if !due.is_empty() {
                    trace!(count = due.len(), "dispatching due tasks");
                }
                for task in due {
                    in_flight.spawn(task);
                }
            }
        }
    }

    in_flight.detach_all();
    shared.wheel.lock().clear();
    debug!("time wheel stopped");
}

fn report(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "scheduled task panicked");
        } else {
            debug!(error = %e, "scheduled task did not complete");
        }
    }
}
