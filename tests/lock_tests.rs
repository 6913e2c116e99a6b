//! Integration tests for the reentrant lease lock against in-process stores.

use lease_lock_core::prelude::*;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::flaky_store::FlakyStore;

/// Two lock objects on one store behave like two processes.
fn two_processes(
    store: &MemoryStore,
) -> (DistributedLock<MemoryStore>, DistributedLock<MemoryStore>) {
    let first = DistributedLock::new(store.clone()).unwrap();
    let second = DistributedLock::new(store.clone()).unwrap();
    (first, second)
}

#[tokio::test(start_paused = true)]
async fn test_contended_key_handover_between_owners() {
    let store = MemoryStore::new();
    let lock = DistributedLock::new(store.clone()).unwrap();
    let a = LockOwner::from("A");
    let b = LockOwner::from("B");

    // Owner A takes the lock with a 30 second lease
    let request = LockRequest::new().lease(Duration::from_secs(30));
    assert!(lock.lock_with("res1", &a, request).await);

    // Owner B is refused within the lease
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!lock.lock("res1", &b).await);

    // After A releases, B gets it immediately
    lock.unlock("res1", &a).await;
    assert!(lock.lock("res1", &b).await);
    assert_eq!(lock.hold_count("res1", &b), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reentrancy_symmetry() {
    let store = MemoryStore::new();
    let lock = DistributedLock::new(store.clone()).unwrap();
    let owner = LockOwner::from("worker");

    for n in 1..=5 {
        assert!(lock.lock("res", &owner).await);
        assert_eq!(lock.hold_count("res", &owner), n);
    }

    for remaining in (1..5).rev() {
        lock.unlock("res", &owner).await;
        assert_eq!(lock.hold_count("res", &owner), remaining);
        assert!(store.contains_key("res"));
    }

    lock.unlock("res", &owner).await;
    assert!(!store.contains_key("res"));
}

#[tokio::test(start_paused = true)]
async fn test_mutual_exclusion_across_processes() {
    let store = MemoryStore::new();
    let (first, second) = two_processes(&store);
    let owner = LockOwner::from("same-id");

    assert!(first.lock("res", &owner).await);
    // No cross-process reentrancy, even for an equal owner id
    assert!(!second.lock("res", &owner).await);
    assert!(!second.is_held_locally("res"));

    // Unlock from the process that does not hold it is a no-op
    second.unlock("res", &owner).await;
    assert!(store.contains_key("res"));

    first.unlock("res", &owner).await;
    assert!(second.lock("res", &owner).await);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_owners_only_one_wins() {
    let store = MemoryStore::new();
    let lock = Arc::new(DistributedLock::new(store.clone()).unwrap());

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..16u64 {
        let lock = lock.clone();
        tasks.spawn(async move { lock.lock("hot", &LockOwner::from(i)).await });
    }

    let mut winners = 0;
    while let Some(result) = tasks.join_next().await {
        if result.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(lock.held_keys(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_short_lease_is_never_renewed() {
    let store = FlakyStore::new();
    let lock = DistributedLock::new(store.clone()).unwrap();
    let owner = LockOwner::from("A");

    let request = LockRequest::new().lease(Duration::from_secs(10));
    assert!(lock.lock_with("res", &owner, request).await);
    assert_eq!(lock.scheduler().pending(), 0);

    tokio::time::sleep(Duration::from_millis(10_001)).await;
    assert!(!store.inner().contains_key("res"));
    assert_eq!(store.renewals(), 0);

    // The local record outlives the lease; another process can take the key
    assert!(lock.is_held_locally("res"));
    let other = DistributedLock::new(store.clone()).unwrap();
    assert!(other.lock("res", &LockOwner::from("B")).await);
}

#[tokio::test(start_paused = true)]
async fn test_long_lease_outlives_its_ttl_while_held() {
    let store = FlakyStore::new();
    let lock = DistributedLock::new(store.clone()).unwrap();
    let owner = LockOwner::from("A");

    assert!(lock.lock("res", &owner).await);

    tokio::time::sleep(Duration::from_secs(95)).await;
    assert!(store.inner().contains_key("res"));
    assert!(store.renewals() >= 8);
    assert!(store.inner().ttl("res").unwrap() > Duration::from_secs(5));

    // After release, renewals stop and the key is gone
    lock.unlock("res", &owner).await;
    let renewals = store.renewals();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(store.renewals(), renewals);
    assert!(!store.inner().contains_key("res"));
}

#[tokio::test(start_paused = true)]
async fn test_unrenewed_lease_expires_after_drop() {
    let store = MemoryStore::new();
    let owner = LockOwner::from("A");
    {
        let lock = DistributedLock::new(store.clone()).unwrap();
        assert!(lock.lock("res", &owner).await);
    }

    // Dropping the lock stops its watchdog; the lease runs out on its own
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(store.contains_key("res"));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!store.contains_key("res"));
}

#[tokio::test(start_paused = true)]
async fn test_release_never_deletes_a_reacquired_key() {
    let store = MemoryStore::new();
    let (first, second) = two_processes(&store);
    let a = LockOwner::from("A");
    let b = LockOwner::from("B");

    let short = LockRequest::new().lease(Duration::from_secs(2));
    assert!(first.lock_with("res", &a, short).await);
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(second.lock("res", &b).await);
    first.unlock("res", &a).await;

    assert!(!first.is_held_locally("res"));
    assert_eq!(store.peek("res").as_deref(), Some(second.token()));
}

#[tokio::test(start_paused = true)]
async fn test_store_unavailable_during_lock() {
    let store = FlakyStore::new();
    let lock = DistributedLock::new(store.clone()).unwrap();
    let owner = LockOwner::from("A");

    store.set_failing(true);
    assert!(!lock.lock("res", &owner).await);
    assert!(!lock.is_held_locally("res"));

    store.set_failing(false);
    assert!(lock.lock("res", &owner).await);
}

#[tokio::test(start_paused = true)]
async fn test_store_unavailable_during_unlock() {
    let store = FlakyStore::new();
    let lock = DistributedLock::new(store.clone()).unwrap();
    let owner = LockOwner::from("A");

    let request = LockRequest::new().lease(Duration::from_secs(5));
    assert!(lock.lock_with("res", &owner, request).await);

    store.set_failing(true);
    lock.unlock("res", &owner).await;
    assert!(!lock.is_held_locally("res"));

    // The key leaks until its lease ends
    store.set_failing(false);
    assert!(store.inner().contains_key("res"));
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!store.inner().contains_key("res"));
}

#[tokio::test(start_paused = true)]
async fn test_renewal_failures_do_not_stop_the_watchdog() {
    let store = FlakyStore::new();
    let lock = DistributedLock::builder(store.clone())
        .expiry(Duration::from_secs(3))
        .extension_cadence(Duration::from_secs(1))
        .build()
        .unwrap();
    let owner = LockOwner::from("A");

    assert!(lock.lock("res", &owner).await);

    store.set_failing(true);
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    store.set_failing(false);
    let failed_attempts = store.renewals();
    assert!(failed_attempts >= 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(store.renewals() > failed_attempts);
    assert!(store.inner().contains_key("res"));
}

#[tokio::test(start_paused = true)]
async fn test_double_release_is_noop() {
    let store = MemoryStore::new();
    let lock = DistributedLock::new(store.clone()).unwrap();
    let a = LockOwner::from("A");
    let b = LockOwner::from("B");

    assert!(lock.lock("res", &a).await);
    lock.unlock("res", &a).await;
    lock.unlock("res", &a).await;

    assert!(lock.lock("res", &b).await);
    lock.unlock("res", &a).await;
    assert_eq!(lock.hold_count("res", &b), 1);
    assert!(store.contains_key("res"));
}

#[tokio::test(start_paused = true)]
async fn test_shared_scheduler_survives_lock_drop() {
    let scheduler = TimeWheel::start(TimeWheelConfig::default()).unwrap();
    let store = MemoryStore::new();
    {
        let lock = DistributedLock::builder(store.clone())
            .scheduler(scheduler.clone())
            .build()
            .unwrap();
        assert!(lock.lock("res", &LockOwner::from("A")).await);
        assert_eq!(scheduler.pending(), 1);
    }

    assert!(!scheduler.is_stopped());
    assert_eq!(scheduler.pending(), 0);
    scheduler.stop();
}

#[tokio::test]
async fn test_failing_store_reports_connection_errors() {
    let store = FlakyStore::new();
    assert!(store.set_if_absent("k", "v", Duration::from_secs(1)).await.unwrap());

    store.set_failing(true);
    let err = store.get("k").await.unwrap_err();
    assert!(matches!(err, LockError::Connection(_)));

    store.set_failing(false);
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
}
