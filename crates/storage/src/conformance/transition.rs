use std::future::Future;

use super::{describe, seed, TestResult};
use crate::{ApprovalStatus, StorageError, VersionStore};

pub(super) async fn run_transition_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    // Pending -> terminal
    results.push(TestResult::from_result(
        "transition",
        "approve_pending_returns_prior_status",
        approve_pending_returns_prior_status(factory).await,
    ));
    results.push(TestResult::from_result(
        "transition",
        "reject_pending_sets_rejected",
        reject_pending_sets_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "transition",
        "status_change_advances_updated_at_only",
        status_change_advances_updated_at_only(factory).await,
    ));

    // Idempotent replay
    results.push(TestResult::from_result(
        "transition",
        "approve_twice_is_idempotent",
        approve_twice_is_idempotent(factory).await,
    ));
    results.push(TestResult::from_result(
        "transition",
        "reject_twice_is_idempotent",
        reject_twice_is_idempotent(factory).await,
    ));

    // Conflicts
    results.push(TestResult::from_result(
        "transition",
        "reject_after_approve_conflicts",
        reject_after_approve_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "transition",
        "approve_after_reject_conflicts",
        approve_after_reject_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "transition",
        "conflict_has_correct_fields",
        conflict_has_correct_fields(factory).await,
    ));

    // Missing rows
    results.push(TestResult::from_result(
        "transition",
        "update_missing_returns_not_found",
        update_missing_returns_not_found(factory).await,
    ));

    results
}

async fn approve_pending_returns_prior_status<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "1").await?;
    let update = s
        .update_status("p1", "1", ApprovalStatus::Approved)
        .await
        .map_err(|e| e.to_string())?;
    if update.previous != ApprovalStatus::Pending
        || update.current != ApprovalStatus::Approved
        || !update.changed
    {
        return Err(format!("unexpected update result: {update:?}"));
    }
    let rec = s.get("p1", "1").await.map_err(|e| e.to_string())?;
    if rec.status != ApprovalStatus::Approved {
        return Err(format!("expected Approved, got {}", rec.status));
    }
    Ok(())
}

async fn reject_pending_sets_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "1").await?;
    s.update_status("p1", "1", ApprovalStatus::Rejected)
        .await
        .map_err(|e| e.to_string())?;
    let rec = s.get("p1", "1").await.map_err(|e| e.to_string())?;
    if rec.status != ApprovalStatus::Rejected {
        return Err(format!("expected Rejected, got {}", rec.status));
    }
    Ok(())
}

/// Only `status` and `updated_at` may move; text and `created_at` stay fixed.
async fn status_change_advances_updated_at_only<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut record = super::make_record("p1", "1");
    record.created_at = "2020-01-01T00:00:00Z".into();
    record.updated_at = "2020-01-01T00:00:00Z".into();
    let text = record.prompt_text.clone();
    s.put(record).await.map_err(|e| e.to_string())?;
    s.update_status("p1", "1", ApprovalStatus::Approved)
        .await
        .map_err(|e| e.to_string())?;

    let rec = s.get("p1", "1").await.map_err(|e| e.to_string())?;
    if rec.prompt_text != text {
        return Err("prompt text changed".into());
    }
    if rec.created_at != "2020-01-01T00:00:00Z" {
        return Err(format!("created_at changed to {}", rec.created_at));
    }
    if rec.updated_at == "2020-01-01T00:00:00Z" {
        return Err("updated_at was not advanced".into());
    }
    Ok(())
}

async fn approve_twice_is_idempotent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "1").await?;
    s.update_status("p1", "1", ApprovalStatus::Approved)
        .await
        .map_err(|e| e.to_string())?;
    let before = s.get("p1", "1").await.map_err(|e| e.to_string())?;

    let update = s
        .update_status("p1", "1", ApprovalStatus::Approved)
        .await
        .map_err(|e| format!("second approve failed: {e}"))?;
    if update.changed || update.previous != ApprovalStatus::Approved {
        return Err(format!("replay reported a change: {update:?}"));
    }
    let after = s.get("p1", "1").await.map_err(|e| e.to_string())?;
    if after != before {
        return Err(format!("replay mutated the row: {before:?} -> {after:?}"));
    }
    Ok(())
}

async fn reject_twice_is_idempotent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "1").await?;
    s.update_status("p1", "1", ApprovalStatus::Rejected)
        .await
        .map_err(|e| e.to_string())?;
    let update = s
        .update_status("p1", "1", ApprovalStatus::Rejected)
        .await
        .map_err(|e| format!("second reject failed: {e}"))?;
    if update.changed {
        return Err("replay reported a change".into());
    }
    Ok(())
}

async fn reject_after_approve_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "1").await?;
    s.update_status("p1", "1", ApprovalStatus::Approved)
        .await
        .map_err(|e| e.to_string())?;
    let result = s.update_status("p1", "1", ApprovalStatus::Rejected).await;
    if !matches!(result, Err(StorageError::Conflict { .. })) {
        return Err(format!("expected Conflict, got {}", describe(&result)));
    }
    let rec = s.get("p1", "1").await.map_err(|e| e.to_string())?;
    if rec.status != ApprovalStatus::Approved {
        return Err(format!("conflict changed status to {}", rec.status));
    }
    Ok(())
}

async fn approve_after_reject_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "1").await?;
    s.update_status("p1", "1", ApprovalStatus::Rejected)
        .await
        .map_err(|e| e.to_string())?;
    let result = s.update_status("p1", "1", ApprovalStatus::Approved).await;
    if !matches!(result, Err(StorageError::Conflict { .. })) {
        return Err(format!("expected Conflict, got {}", describe(&result)));
    }
    let rec = s.get("p1", "1").await.map_err(|e| e.to_string())?;
    if rec.status != ApprovalStatus::Rejected {
        return Err(format!("conflict changed status to {}", rec.status));
    }
    Ok(())
}

async fn conflict_has_correct_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p9", "3").await?;
    s.update_status("p9", "3", ApprovalStatus::Approved)
        .await
        .map_err(|e| e.to_string())?;
    match s.update_status("p9", "3", ApprovalStatus::Rejected).await {
        Err(StorageError::Conflict {
            prompt_id,
            version,
            current,
            requested,
        }) => {
            if prompt_id != "p9" || version != "3" {
                return Err(format!("wrong key in conflict: {prompt_id}/{version}"));
            }
            if current != ApprovalStatus::Approved || requested != ApprovalStatus::Rejected {
                return Err(format!("wrong statuses: current={current} requested={requested}"));
            }
            Ok(())
        }
        other => Err(format!("expected Conflict, got {}", describe(&other))),
    }
}

async fn update_missing_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for status in [ApprovalStatus::Approved, ApprovalStatus::Rejected] {
        match s.update_status("unknown-id", "1", status).await {
            Err(StorageError::NotFound { .. }) => {}
            other => return Err(format!("expected NotFound, got {}", describe(&other))),
        }
    }
    Ok(())
}
