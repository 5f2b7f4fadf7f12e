//! HTTP middleware: rate limiting and API key authentication.

use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::state::AppState;

/// Rate limiting middleware. Checks per-IP request rate before routing.
pub(crate) async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();
    match state.rate_limiter.check(ip).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!(ip = %ip, retry_after, "rate limit exceeded");
            let body = serde_json::json!({
                "error": "rate limit exceeded",
                "retry_after": retry_after,
            });
            (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
        }
    }
}

/// Routes that register versions or inject feed events.
///
/// Decision links and `/health` stay open so reviewers can follow a link
/// straight from their inbox.
pub(crate) fn requires_auth(path: &str) -> bool {
    path == "/versions" || path.starts_with("/versions/") || path == "/feed"
}

/// The key a client presented: `Authorization: Bearer <key>` first, then
/// `X-API-Key: <key>`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    bearer.or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()))
}

/// API key authentication middleware.
///
/// With an API key configured, administrative routes answer 401 without a
/// key and 403 with the wrong one.
pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };
    if !requires_auth(request.uri().path()) {
        return next.run(request).await;
    }

    let refusal = match presented_key(request.headers()) {
        Some(key) if key == expected => None,
        Some(_) => Some((StatusCode::FORBIDDEN, "invalid API key")),
        None => Some((StatusCode::UNAUTHORIZED, "authentication required")),
    };
    match refusal {
        None => next.run(request).await,
        Some((status, message)) => {
            tracing::warn!(path = %request.uri().path(), status = %status, "request refused");
            super::json_error(status, message).into_response()
        }
    }
}
