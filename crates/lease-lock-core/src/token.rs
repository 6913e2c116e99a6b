//! Lock token generation.

use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

/// Generates a token unique to this process and call.
///
/// Format: `{process_id}_{counter}_{random_hex}`
pub fn create_session_token() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    let pid = process::id();

    let mut rng = rand::thread_rng();
    let random: u64 = rng.r#gen();

    format!("{}_{}_{:016x}", pid, counter, random)
}
