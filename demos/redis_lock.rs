//! Example: Using Redis lease locks
//!
//! Run with: `cargo run --example redis_lock`
//!
//! Requires a Redis server. Set REDIS_URL environment variable
//! or modify the URL below.

use lease_lock::*;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,lease_lock_core=debug".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Get Redis URL from environment or use default
    let redis_url = std::env::var("REDIS_URL")
        .unwrap_or_else(|_| "redis://localhost:6379".to_string());

    println!("Connecting to Redis...");
    let store = RedisLockStore::builder().url(&redis_url).build().await?;
    let lock = DistributedLock::builder(store)
        .expiry(Duration::from_secs(30))
        .extension_cadence(Duration::from_secs(10))
        .build()?;
    println!("Session token: {}", lock.token());

    let owner = LockOwner::from("example-job");

    println!("Acquiring lock...");
    if !lock.lock("example-resource", &owner).await {
        println!("Lock is held by someone else, giving up");
        return Ok(());
    }
    println!("Lock acquired! (will be renewed by the watchdog)");

    // Reentrant acquisition by the same owner
    assert!(lock.lock("example-resource", &owner).await);
    println!("Hold count: {}", lock.hold_count("example-resource", &owner));

    // Outlive the 30 second lease; the watchdog keeps the key alive
    println!("Doing long-running work...");
    tokio::time::sleep(Duration::from_secs(45)).await;
    println!("Work completed");

    lock.unlock("example-resource", &owner).await;
    lock.unlock("example-resource", &owner).await;
    println!("Lock released");

    lock.shutdown().await;
    Ok(())
}
