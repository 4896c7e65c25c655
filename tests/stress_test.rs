//! Randomized scheduler sequences
//!
//! Random interleavings of enqueue, preempt, advance, completion and remote
//! outages, with the scheduler invariants checked after every step:
//! A - No id is held twice across the slot and the two queues
//! B - A running watch implies an occupied slot
//! C - A completed request never re-enters the scheduler
//! D - Every request completes exactly once

mod common;

use common::{eventually, fast_monitor, harness, request, Harness};
use magnet_relay::{QueueManager, SchedulerSnapshot};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const NUM_REQUESTS: i64 = 12;

fn held_ids(snapshot: &SchedulerSnapshot) -> Vec<i64> {
    let mut all = snapshot.primary.clone();
    all.extend(&snapshot.suspended);
    all.extend(snapshot.current);
    all
}

// ============================================================================
// INVARIANT CHECKING HELPERS
// ============================================================================

/// Invariant A: no duplicate ids across containers
fn check_no_duplicates(snapshot: &SchedulerSnapshot) -> Result<(), String> {
    let mut seen = HashSet::new();
    for id in held_ids(snapshot) {
        if !seen.insert(id) {
            return Err(format!("DUPLICATE ID {} in {:?}", id, snapshot));
        }
    }
    Ok(())
}

/// Invariant B: watching implies a current request
fn check_watch_has_slot(snapshot: &SchedulerSnapshot) -> Result<(), String> {
    if snapshot.watching && snapshot.current.is_none() {
        return Err(format!("WATCHING WITH EMPTY SLOT: {:?}", snapshot));
    }
    Ok(())
}

/// Invariant C: completed ids are gone for good
fn check_completed_absent(snapshot: &SchedulerSnapshot, completed: &[i64]) -> Result<(), String> {
    for id in held_ids(snapshot) {
        if completed.contains(&id) {
            return Err(format!("COMPLETED ID {} REAPPEARED in {:?}", id, snapshot));
        }
    }
    Ok(())
}

/// Invariant D: no request completed twice
fn check_completed_once(completed: &[i64]) -> Result<(), String> {
    let unique: HashSet<_> = completed.iter().collect();
    if unique.len() != completed.len() {
        return Err(format!("REQUEST COMPLETED TWICE: {:?}", completed));
    }
    Ok(())
}

async fn check_all(h: &Harness) -> Result<(), String> {
    let snapshot = h.manager.snapshot().await;
    let completed = h.store.completed_order();
    check_no_duplicates(&snapshot)?;
    check_watch_has_slot(&snapshot)?;
    check_completed_absent(&snapshot, &completed)?;
    check_completed_once(&completed)
}

/// Let the watched request succeed and wait for the scheduler to move past it
async fn complete_current(h: &Harness) -> bool {
    let snapshot = h.manager.snapshot().await;
    let Some(id) = snapshot.current else {
        return false;
    };
    if !snapshot.watching {
        return false;
    }

    h.remote.succeed(&request(id).content_locator);
    let manager: Arc<QueueManager> = h.manager.clone();
    eventually(|| {
        let manager = manager.clone();
        async move { manager.snapshot().await.current != Some(id) }
    })
    .await
}

// ============================================================================
// STRESS TEST: Random scheduler operations
// ============================================================================

#[tokio::test]
async fn stress_test_random_scheduler_operations() {
    const OPERATION_ROUNDS: usize = 150;

    let h = harness(fast_monitor()).await;
    for id in 1..=NUM_REQUESTS {
        h.store.insert(request(id));
    }

    let mut rng = rand::thread_rng();

    for round in 0..OPERATION_ROUNDS {
        let completed = h.store.completed_order();
        let id = rng.gen_range(1..=NUM_REQUESTS);
        let operation = rng.gen_range(0..6);

        match operation {
            0 => {
                // a scan offers a random subset of what is still pending
                let batch = (1..=NUM_REQUESTS)
                    .filter(|id| !completed.contains(id) && rng.gen_bool(0.5))
                    .map(request)
                    .collect();
                h.manager.enqueue_batch(batch).await;
            }
            1 => {
                if !completed.contains(&id) {
                    let _ = h.manager.preempt(request(id)).await;
                }
            }
            2 => {
                h.manager.advance().await;
            }
            3 => {
                complete_current(&h).await;
            }
            4 => {
                h.remote.set_fail_dirs(rng.gen_bool(0.3));
                h.manager.recover_stalled().await;
            }
            _ => { /* no-op to add variance */ }
        }

        check_all(&h)
            .await
            .unwrap_or_else(|e| panic!("Invariant failed at round {} (op {}): {}", round, operation, e));

        if rng.gen_bool(0.2) {
            sleep(Duration::from_millis(rng.gen_range(1..10))).await;
        }
        tokio::task::yield_now().await;
    }

    // Drain: everything still pending must complete exactly once
    h.remote.set_fail_dirs(false);
    let completed = h.store.completed_order();
    let rest = (1..=NUM_REQUESTS)
        .filter(|id| !completed.contains(id))
        .map(request)
        .collect();
    h.manager.enqueue_batch(rest).await;
    h.manager.recover_stalled().await;
    if h.manager.is_idle().await {
        h.manager.advance().await;
    }

    for _ in 0..NUM_REQUESTS {
        if h.manager.is_idle().await {
            break;
        }
        assert!(complete_current(&h).await, "scheduler stopped making progress");
        check_all(&h).await.expect("Invariant failed while draining");
    }

    let snapshot = h.manager.snapshot().await;
    assert!(h.manager.is_idle().await, "slot still held: {:?}", snapshot);
    assert!(snapshot.primary.is_empty() && snapshot.suspended.is_empty());

    let mut completed = h.store.completed_order();
    check_completed_once(&completed).expect("Final completion check failed");
    completed.sort_unstable();
    assert_eq!(completed, (1..=NUM_REQUESTS).collect::<Vec<_>>());
}

/// Stress test: many preempts racing for the slot
#[tokio::test]
async fn stress_test_concurrent_preempts() {
    const CONCURRENT_PREEMPTS: usize = 16;

    let h = harness(fast_monitor()).await;
    h.manager
        .enqueue_batch((1..=NUM_REQUESTS).map(request).collect())
        .await;
    h.manager.advance().await;

    let mut rng = rand::thread_rng();
    let ids: Vec<i64> = (0..CONCURRENT_PREEMPTS)
        .map(|_| rng.gen_range(1..=NUM_REQUESTS))
        .collect();

    let mut handles = vec![];
    for id in ids {
        let manager = h.manager.clone();
        handles.push(tokio::spawn(async move {
            manager.preempt(request(id)).await.ok();
        }));
    }
    for handle in handles {
        handle.await.ok();
    }

    check_all(&h)
        .await
        .expect("Invariant violated after concurrent preempts");

    let snapshot = h.manager.snapshot().await;
    assert!(snapshot.watching);
    let mut held = held_ids(&snapshot);
    held.sort_unstable();
    assert_eq!(held, (1..=NUM_REQUESTS).collect::<Vec<_>>());
}
