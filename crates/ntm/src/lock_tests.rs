// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::{AcquireOutcome, Lock, LockTable};
use crate::bus::{Bus, Filter};
use crate::event::EventKind;
use crate::persist::read_jsonl;

const TTL: Duration = Duration::from_secs(60);

#[tokio::test]
async fn acquire_then_conflict() {
    let bus = Bus::new(None);
    let table = LockTable::new(None, bus);

    let outcome = table.acquire("src/main.rs", "%0", "editing", TTL).await;
    assert!(matches!(outcome, AcquireOutcome::Acquired(_)));

    let outcome = table.acquire("src/main.rs", "%1", "editing", TTL).await;
    match outcome {
        AcquireOutcome::Conflict { holder_pane_id } => assert_eq!(holder_pane_id, "%0"),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn reacquire_by_holder_renews() {
    let bus = Bus::new(None);
    let table = LockTable::new(None, bus);

    table.acquire("file.txt", "%0", "first", TTL).await;
    let outcome = table.acquire("file.txt", "%0", "again", Duration::from_secs(120)).await;
    match outcome {
        AcquireOutcome::Renewed(lock) => {
            assert_eq!(lock.renew_count, 1);
            assert_eq!(lock.ttl_ms, 120_000);
        }
        other => panic!("expected renewal, got {other:?}"),
    }
}

#[tokio::test]
async fn release_requires_holder() {
    let bus = Bus::new(None);
    let table = LockTable::new(None, bus);
    table.acquire("file.txt", "%0", "", TTL).await;

    assert!(!table.release("file.txt", "%1").await);
    assert!(table.release("file.txt", "%0").await);
    assert!(table.list().await.is_empty());
}

#[tokio::test]
async fn release_all_frees_everything_held_by_pane() {
    let bus = Bus::new(None);
    let table = LockTable::new(None, bus);
    table.acquire("a.txt", "%0", "", TTL).await;
    table.acquire("b.txt", "%0", "", TTL).await;
    table.acquire("c.txt", "%1", "", TTL).await;

    assert_eq!(table.release_all("%0").await, 2);
    let remaining = table.list().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].holder_pane_id, "%1");
}

#[tokio::test]
async fn expiry_sweep_releases_and_announces() {
    let bus = Bus::new(None);
    let table = LockTable::new(None, Arc::clone(&bus));
    let mut sub = bus.subscribe(Filter::for_topics(["lock.released"]));

    table.acquire("stale.txt", "%0", "", Duration::from_millis(10)).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(table.sweep_expired().await, 1);

    let event = sub.recv().await.unwrap();
    match event.kind {
        EventKind::LockReleased { resource, reason, .. } => {
            assert_eq!(resource, "stale.txt");
            assert_eq!(reason, "expired");
        }
        other => panic!("unexpected event {other:?}"),
    }
    // An expired lock is acquirable by a new holder.
    assert!(matches!(
        table.acquire("stale.txt", "%1", "", TTL).await,
        AcquireOutcome::Acquired(_)
    ));
}

#[tokio::test]
async fn expired_lock_is_acquirable_even_before_sweep() {
    let bus = Bus::new(None);
    let table = LockTable::new(None, bus);
    table.acquire("fast.txt", "%0", "", Duration::from_millis(5)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(matches!(
        table.acquire("fast.txt", "%1", "", TTL).await,
        AcquireOutcome::Acquired(_)
    ));
}

#[tokio::test]
async fn projection_restores_unexpired_locks() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("locks.jsonl");
    {
        let bus = Bus::new(None);
        let table = LockTable::new(Some(path.clone()), bus);
        table.acquire("kept.txt", "%0", "reason", TTL).await;
    }
    let records: Vec<Lock> = read_jsonl(&path);
    assert_eq!(records.len(), 1);

    let bus = Bus::new(None);
    let restored = LockTable::new(Some(path), bus);
    restored.load().await;
    let locks = restored.list().await;
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0].resource, "kept.txt");
}
