//! `promptgate serve`: HTTP server for decision links and the version registry.
//!
//! Security features:
//! - CORS headers on all responses
//! - Per-IP rate limiting (default: 60 req/min, configurable)
//! - Optional API key on administrative routes
//!
//! Endpoints:
//! - GET  /health                          - Server status
//! - GET  /approve?promptId=..&version=..  - Approve a pending version
//! - GET  /reject?promptId=..&version=..   - Reject a pending version
//! - POST /versions                        - Register a new version (admin)
//! - GET  /versions/{promptId}             - List versions, `?status=` filter (admin)
//! - GET  /versions/{promptId}/{version}   - Read one version (admin)
//! - POST /feed                            - Ingest a change feed batch (admin)
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use promptgate_core::{
    ChangeFeedWatcher, DistributionList, LogTopic, Notifier, Topic, WebhookTopic,
};
use promptgate_sqlite::SqliteVersionStore;
use promptgate_storage::{
    feed_channel, ChangeEvent, FeedingStore, InMemoryVersionStore, VersionStore,
};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

use self::handlers::{
    handle_approve, handle_feed, handle_get_version, handle_health, handle_list_versions,
    handle_not_found, handle_register, handle_reject,
};
use self::middleware::{auth_middleware, rate_limit_middleware};
use self::state::AppState;
use crate::config::{Config, StoreBackend, StoreConfig, Transport};

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Buffered change events between the store and the watcher.
const FEED_CAPACITY: usize = 1024;

/// How long shutdown waits for the watcher to drain the feed.
const WATCHER_DRAIN_SECS: u64 = 10;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

fn build_store(
    config: &StoreConfig,
    sender: mpsc::Sender<ChangeEvent>,
) -> Result<Arc<dyn VersionStore>, Box<dyn std::error::Error>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(FeedingStore::new(
            InMemoryVersionStore::new(),
            sender,
        ))),
        StoreBackend::Sqlite => {
            let path = config
                .path
                .as_deref()
                .ok_or("store.backend = \"sqlite\" requires store.path")?;
            let store = SqliteVersionStore::open(path)?;
            tracing::info!(path = %path.display(), "sqlite version store opened");
            Ok(Arc::new(FeedingStore::new(store, sender)))
        }
    }
}

fn build_topic(config: &Config) -> Arc<dyn Topic> {
    let notifier = &config.notifier;
    match notifier.transport {
        Transport::Log => Arc::new(LogTopic::new(notifier.topic.clone())),
        Transport::Webhook => {
            let list = Arc::new(DistributionList::new(notifier.subscribers.iter().cloned()));
            let mut topic = WebhookTopic::new(notifier.topic.clone(), list)
                .with_timeout(Duration::from_secs(notifier.timeout_secs));
            if let Some(token) = &notifier.auth_token {
                topic = topic.with_auth_token(token.clone());
            }
            Arc::new(topic)
        }
    }
}

/// Build the router around an already assembled state.
fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/approve", get(handle_approve))
        .route("/reject", get(handle_reject))
        .route("/versions", post(handle_register))
        .route("/versions/{prompt_id}", get(handle_list_versions))
        .route("/versions/{prompt_id}/{version}", get(handle_get_version))
        .route("/feed", post(handle_feed))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server and the change feed watcher.
///
/// Returns after a Ctrl+C once the watcher has drained the feed.
pub(crate) async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let (sender, feed) = feed_channel(FEED_CAPACITY);
    let store = build_store(&config.store, sender)?;

    let base_url = config.public_base_url();
    let notifier = Notifier::new(&base_url, build_topic(&config))?
        .with_subject_prefix(config.notifier.subject_prefix.clone());
    let watcher = Arc::new(ChangeFeedWatcher::new(Arc::new(notifier)));

    let watch_task = {
        let watcher = watcher.clone();
        tokio::spawn(async move { watcher.run(feed).await })
    };

    if config.server.api_key.is_some() {
        tracing::info!("API key authentication enabled on administrative routes");
    }
    tracing::info!(
        rate_limit = config.server.rate_limit,
        public_base_url = %base_url,
        "decision links will point at the public base URL"
    );

    let state = Arc::new(AppState::new(
        store,
        watcher,
        config.server.rate_limit,
        config.server.api_key.clone(),
    ));
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("promptgate listening on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // The router (and with it the last feed sender) is gone; let the
    // watcher finish what is queued.
    match tokio::time::timeout(Duration::from_secs(WATCHER_DRAIN_SECS), watch_task).await {
        Ok(Ok(summary)) => tracing::info!(
            inserts = summary.inserts,
            notified = summary.notified,
            failed = summary.failed,
            "watcher drained"
        ),
        Ok(Err(e)) => tracing::error!(error = %e, "watcher task failed"),
        Err(_) => tracing::warn!("watcher did not drain before the shutdown deadline"),
    }

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("received shutdown signal");
}
