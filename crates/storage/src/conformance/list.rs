use std::future::Future;

use super::{seed, TestResult};
use crate::{ApprovalStatus, VersionStore};

pub(super) async fn run_list_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "list",
            "list_returns_versions_of_one_prompt",
            list_returns_versions_of_one_prompt(factory).await,
        ),
        TestResult::from_result(
            "list",
            "list_filters_by_status",
            list_filters_by_status(factory).await,
        ),
        TestResult::from_result(
            "list",
            "list_unknown_prompt_is_empty",
            list_unknown_prompt_is_empty(factory).await,
        ),
    ]
}

async fn list_returns_versions_of_one_prompt<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "2").await?;
    seed(&s, "p1", "1").await?;
    seed(&s, "p2", "1").await?;

    let versions: Vec<String> = s
        .list("p1", None)
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|r| r.version)
        .collect();
    if versions != ["1", "2"] {
        return Err(format!("expected [1, 2], got {versions:?}"));
    }
    Ok(())
}

async fn list_filters_by_status<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "1").await?;
    seed(&s, "p1", "2").await?;
    seed(&s, "p1", "3").await?;
    s.update_status("p1", "2", ApprovalStatus::Approved)
        .await
        .map_err(|e| e.to_string())?;

    let approved = s
        .list("p1", Some(ApprovalStatus::Approved))
        .await
        .map_err(|e| e.to_string())?;
    if approved.len() != 1 || approved[0].version != "2" {
        return Err(format!("expected only version 2, got {approved:?}"));
    }
    let pending = s
        .list("p1", Some(ApprovalStatus::Pending))
        .await
        .map_err(|e| e.to_string())?;
    if pending.len() != 2 {
        return Err(format!("expected 2 pending, got {}", pending.len()));
    }
    Ok(())
}

async fn list_unknown_prompt_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rows = s.list("nothing", None).await.map_err(|e| e.to_string())?;
    if !rows.is_empty() {
        return Err(format!("expected empty list, got {} rows", rows.len()));
    }
    Ok(())
}
