use std::future::Future;
use std::sync::Arc;

use super::{make_record, seed, TestResult};
use crate::{ApprovalStatus, StorageError, VersionStore};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "racing_opposite_decisions_exactly_one_wins",
            racing_opposite_decisions_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "racing_same_decision_exactly_one_changes",
            racing_same_decision_exactly_one_changes(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_put_exactly_one_wins",
            concurrent_put_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "decisions_on_different_keys_all_succeed",
            decisions_on_different_keys_all_succeed(factory).await,
        ),
    ]
}

// ── Opposite decisions: one commit, the rest Conflict or replay ──────────────

/// N tasks alternate approve / reject against one Pending row. Exactly one
/// task observes `changed = true`. Every other task either replays the
/// winning decision (`changed = false`) or gets `Conflict`, and the final
/// status matches the winner.
async fn racing_opposite_decisions_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed(storage.as_ref(), "p1", "1").await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        let decision = if i % 2 == 0 {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        handles.push(tokio::spawn(async move {
            match s.update_status("p1", "1", decision).await {
                Ok(update) => Ok((decision, update.changed, false)),
                Err(StorageError::Conflict { .. }) => Ok((decision, false, true)),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = Vec::new();
    let mut conflicts = 0usize;
    let mut replays = Vec::new();
    for handle in handles {
        let (decision, changed, conflicted) = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if changed {
            winners.push(decision);
        } else if conflicted {
            conflicts += 1;
        } else {
            replays.push(decision);
        }
    }

    if winners.len() != 1 {
        return Err(format!("expected exactly 1 winner, got {}", winners.len()));
    }
    let winner = winners[0];
    if replays.iter().any(|d| *d != winner) {
        return Err("a losing decision reported idempotent success".into());
    }
    if conflicts == 0 {
        return Err("expected the opposite decisions to conflict".into());
    }
    let rec = storage.get("p1", "1").await.map_err(|e| e.to_string())?;
    if rec.status != winner {
        return Err(format!("final status {} != winner {}", rec.status, winner));
    }
    Ok(())
}

// ── Same decision: one change, the rest idempotent ───────────────────────────

async fn racing_same_decision_exactly_one_changes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed(storage.as_ref(), "p1", "1").await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            s.update_status("p1", "1", ApprovalStatus::Approved).await
        }));
    }

    let mut changed = 0usize;
    for handle in handles {
        let update = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("same-decision replay failed: {e}"))?;
        if update.changed {
            changed += 1;
        }
    }
    if changed != 1 {
        return Err(format!("expected exactly 1 change, got {changed}"));
    }
    Ok(())
}

// ── Concurrent insert: exactly one wins ──────────────────────────────────────

async fn concurrent_put_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            match s.put(make_record("p1", "1")).await {
                Ok(()) => Ok(true),
                Err(StorageError::DuplicateKey { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

// ── Different keys: no false conflicts ───────────────────────────────────────

async fn decisions_on_different_keys_all_succeed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    for i in 0..N {
        seed(storage.as_ref(), "p1", &i.to_string()).await?;
    }

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            s.update_status("p1", &i.to_string(), ApprovalStatus::Approved)
                .await
        }));
    }
    for handle in handles {
        let update = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("unexpected failure: {e}"))?;
        if !update.changed {
            return Err("independent key reported no change".into());
        }
    }
    Ok(())
}
