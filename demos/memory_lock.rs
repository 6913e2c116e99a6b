//! Example: Coordinating tasks in one process with the in-memory store
//!
//! Run with: `cargo run --example memory_lock`

use lease_lock::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let lock = Arc::new(DistributedLock::new(MemoryStore::new())?);

    let mut workers = Vec::new();
    for id in 0..4u64 {
        let lock = lock.clone();
        workers.push(tokio::spawn(async move {
            let owner = LockOwner::from(id);
            loop {
                if lock.lock("shared-counter", &owner).await {
                    println!("worker {id} holds the lock");
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    lock.unlock("shared-counter", &owner).await;
                    break;
                }
                // Backoff is the caller's business
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }));
    }

    for worker in workers {
        worker.await?;
    }

    lock.shutdown().await;
    Ok(())
}
