//! HTTP route handlers: health, decisions, version registry, feed ingestion.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use promptgate_core::{
    BatchSummary, Decision, DecisionError, DecisionRequest, OrchestratorError, StreamBatch,
};
use promptgate_storage::{ApprovalStatus, StorageError};
use serde::{Deserialize, Serialize};

use super::json_error;
use super::state::AppState;

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": promptgate_core::PROMPTGATE_VERSION,
    });
    (StatusCode::OK, Json(response))
}

// ── Decisions ─────────────────────────────────────────────────────────────────

/// GET /approve?promptId=..&version=..
pub(crate) async fn handle_approve(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DecisionRequest>, QueryRejection>,
) -> Response {
    decide(&state, Decision::Approve, query).await
}

/// GET /reject?promptId=..&version=..
pub(crate) async fn handle_reject(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DecisionRequest>, QueryRejection>,
) -> Response {
    decide(&state, Decision::Reject, query).await
}

async fn decide(
    state: &AppState,
    decision: Decision,
    query: Result<Query<DecisionRequest>, QueryRejection>,
) -> Response {
    let Query(request) = match query {
        Ok(q) => q,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.body_text()).into_response(),
    };
    match state.decisions.handle(decision, &request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => decision_error(e),
    }
}

fn decision_error(err: DecisionError) -> Response {
    let status = match &err {
        DecisionError::BadRequest(_) => StatusCode::BAD_REQUEST,
        DecisionError::NotFound { .. } => StatusCode::NOT_FOUND,
        DecisionError::Conflict { .. } => StatusCode::CONFLICT,
        DecisionError::Storage(e) => {
            tracing::error!(error = %e, "decision failed in storage");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_error(status, &err.to_string()).into_response()
}

// ── Version registry ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterRequest {
    prompt_id: Option<String>,
    version: Option<String>,
    prompt_text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    status: Option<String>,
}

fn storage_error(err: StorageError) -> Response {
    let status = match &err {
        StorageError::DuplicateKey { .. } | StorageError::Conflict { .. } => StatusCode::CONFLICT,
        StorageError::NotFound { .. } => StatusCode::NOT_FOUND,
        StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
        StorageError::Backend(e) => {
            tracing::error!(error = %e, "storage backend failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_error(status, &err.to_string()).into_response()
}

/// POST /versions
pub(crate) async fn handle_register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.body_text()).into_response(),
    };

    let prompt_id = req.prompt_id.filter(|s| !s.trim().is_empty());
    let version = req.version.filter(|s| !s.trim().is_empty());
    let (prompt_id, version, prompt_text) = match (prompt_id, version, req.prompt_text) {
        (Some(p), Some(v), Some(t)) => (p, v, t),
        (p, v, t) => {
            let missing: Vec<&str> = [
                ("promptId", p.is_none()),
                ("version", v.is_none()),
                ("promptText", t.is_none()),
            ]
            .into_iter()
            .filter(|(_, absent)| *absent)
            .map(|(name, _)| name)
            .collect();
            return json_error(
                StatusCode::BAD_REQUEST,
                &format!("missing required field(s): {}", missing.join(", ")),
            )
            .into_response();
        }
    };

    match state
        .orchestrator
        .register_version(&prompt_id, &version, &prompt_text)
        .await
    {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(OrchestratorError::Storage(e)) => storage_error(e),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()).into_response(),
    }
}

/// GET /versions/{prompt_id}/{version}
pub(crate) async fn handle_get_version(
    State(state): State<Arc<AppState>>,
    Path((prompt_id, version)): Path<(String, String)>,
) -> Response {
    match state.store.get(&prompt_id, &version).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => storage_error(e),
    }
}

/// GET /versions/{prompt_id}?status=..
pub(crate) async fn handle_list_versions(
    State(state): State<Arc<AppState>>,
    Path(prompt_id): Path<String>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.body_text()).into_response(),
    };
    let filter = match query.status.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<ApprovalStatus>() {
            Ok(status) => Some(status),
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &e).into_response(),
        },
    };
    match state.store.list(&prompt_id, filter).await {
        Ok(versions) => {
            (StatusCode::OK, Json(serde_json::json!({ "versions": versions }))).into_response()
        }
        Err(e) => storage_error(e),
    }
}

// ── Change feed ingestion ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct FeedResponse {
    #[serde(flatten)]
    summary: BatchSummary,
    skipped: Vec<String>,
}

/// POST /feed
///
/// Accepts a stream record batch from an externally hosted table feed and
/// runs it through the watcher.
pub(crate) async fn handle_feed(State(state): State<Arc<AppState>>, body: String) -> Response {
    let batch = match StreamBatch::from_json(&body) {
        Ok(b) => b,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()).into_response(),
    };
    let decoded = batch.into_events();
    let summary = state.watcher.handle_batch(&decoded.events).await;
    tracing::info!(
        inserts = summary.inserts,
        notified = summary.notified,
        failed = summary.failed,
        skipped = decoded.skipped.len(),
        "feed batch processed"
    );
    let response = FeedResponse {
        summary,
        skipped: decoded.skipped,
    };
    (StatusCode::OK, Json(response)).into_response()
}
