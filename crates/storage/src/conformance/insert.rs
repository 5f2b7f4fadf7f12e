use std::future::Future;

use super::{describe, make_record, seed, TestResult};
use crate::{ApprovalStatus, StorageError, VersionRecord, VersionStore};

pub(super) async fn run_insert_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "insert",
            "put_then_get_returns_pending",
            put_then_get_returns_pending(factory).await,
        ),
        TestResult::from_result(
            "insert",
            "put_preserves_all_fields",
            put_preserves_all_fields(factory).await,
        ),
        TestResult::from_result(
            "insert",
            "duplicate_put_returns_duplicate_key",
            duplicate_put_returns_duplicate_key(factory).await,
        ),
        TestResult::from_result(
            "insert",
            "duplicate_put_does_not_overwrite",
            duplicate_put_does_not_overwrite(factory).await,
        ),
        TestResult::from_result(
            "insert",
            "same_version_different_prompts_are_independent",
            same_version_different_prompts_are_independent(factory).await,
        ),
        TestResult::from_result(
            "insert",
            "blank_key_parts_rejected",
            blank_key_parts_rejected(factory).await,
        ),
        TestResult::from_result(
            "insert",
            "get_missing_returns_not_found",
            get_missing_returns_not_found(factory).await,
        ),
    ]
}

/// A freshly inserted record reads back as Pending.
async fn put_then_get_returns_pending<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "1").await?;
    let rec = s.get("p1", "1").await.map_err(|e| e.to_string())?;
    if rec.status != ApprovalStatus::Pending {
        return Err(format!("expected Pending, got {}", rec.status));
    }
    Ok(())
}

async fn put_preserves_all_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let original = VersionRecord {
        prompt_id: "summarizer".into(),
        version: "7".into(),
        prompt_text: "Summarize the following:\n{{input}}".into(),
        status: ApprovalStatus::Pending,
        created_at: "2025-01-01T00:00:00Z".into(),
        updated_at: "2025-01-01T00:00:00Z".into(),
    };
    s.put(original.clone()).await.map_err(|e| e.to_string())?;
    let rec = s.get("summarizer", "7").await.map_err(|e| e.to_string())?;
    if rec != original {
        return Err(format!("round trip mismatch: {rec:?} != {original:?}"));
    }
    Ok(())
}

async fn duplicate_put_returns_duplicate_key<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "1").await?;
    let result = s.put(make_record("p1", "1")).await;
    match result {
        Err(StorageError::DuplicateKey { prompt_id, version })
            if prompt_id == "p1" && version == "1" =>
        {
            Ok(())
        }
        other => Err(format!("expected DuplicateKey(p1/1), got {}", describe(&other))),
    }
}

/// A rejected duplicate must leave the first record's text and status in place.
async fn duplicate_put_does_not_overwrite<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put(VersionRecord::pending("p1", "1", "first"))
        .await
        .map_err(|e| e.to_string())?;
    s.update_status("p1", "1", ApprovalStatus::Approved)
        .await
        .map_err(|e| e.to_string())?;
    let _ = s.put(VersionRecord::pending("p1", "1", "second")).await;

    let rec = s.get("p1", "1").await.map_err(|e| e.to_string())?;
    if rec.prompt_text != "first" || rec.status != ApprovalStatus::Approved {
        return Err(format!("record was overwritten: {rec:?}"));
    }
    Ok(())
}

async fn same_version_different_prompts_are_independent<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "1").await?;
    seed(&s, "p2", "1").await?;
    s.update_status("p1", "1", ApprovalStatus::Rejected)
        .await
        .map_err(|e| e.to_string())?;
    let other = s.get("p2", "1").await.map_err(|e| e.to_string())?;
    if other.status != ApprovalStatus::Pending {
        return Err(format!("p2/1 changed to {}", other.status));
    }
    Ok(())
}

/// Empty and whitespace-only key parts are refused and nothing is stored.
async fn blank_key_parts_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (prompt_id, version) in [("", "1"), ("p1", ""), (" ", "1"), ("p1", "\t "), ("\n", " ")] {
        match s.put(make_record(prompt_id, version)).await {
            Err(StorageError::InvalidKey(_)) => {}
            other => {
                return Err(format!(
                    "expected InvalidKey for '{prompt_id}'/'{version}', got {}",
                    describe(&other)
                ))
            }
        }
        if s.get(prompt_id, version).await.is_ok() {
            return Err(format!("'{prompt_id}'/'{version}' was stored"));
        }
    }
    Ok(())
}

async fn get_missing_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get("unknown-id", "1").await {
        Err(StorageError::NotFound { .. }) => Ok(()),
        other => Err(format!("expected NotFound, got {}", describe(&other))),
    }
}
