//! Application state and rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use promptgate_core::{ChangeFeedWatcher, DecisionService, Orchestrator};
use promptgate_storage::VersionStore;
use tokio::sync::Mutex;

use super::RATE_LIMIT_WINDOW_SECS;

/// Tracked IPs above which expired windows are swept on the next request.
const PRUNE_THRESHOLD: usize = 10_000;

/// Requests seen from one IP in the current window.
struct Window {
    count: u64,
    started: Instant,
}

impl Window {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.started) >= Duration::from_secs(RATE_LIMIT_WINDOW_SECS)
    }
}

/// In-memory per-IP fixed-window rate limiter.
pub(crate) struct RateLimiter {
    windows: Mutex<HashMap<IpAddr, Window>>,
    max_requests: u64,
    prune_threshold: usize,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: u64) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            prune_threshold: PRUNE_THRESHOLD,
        }
    }

    /// Count one request. Returns `Err(retry_after_secs)` once the IP is
    /// over its budget for the current window.
    pub(crate) async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        if windows.len() >= self.prune_threshold {
            windows.retain(|_, w| !w.expired(now));
        }
        let window = windows.entry(ip).or_insert(Window {
            count: 0,
            started: now,
        });

        if window.expired(now) {
            *window = Window {
                count: 0,
                started: now,
            };
        }

        window.count += 1;
        if window.count <= self.max_requests {
            return Ok(());
        }
        let elapsed = now.duration_since(window.started).as_secs();
        Err(RATE_LIMIT_WINDOW_SECS.saturating_sub(elapsed).max(1))
    }
}

/// Shared by every handler.
pub(crate) struct AppState {
    pub(crate) store: Arc<dyn VersionStore>,
    pub(crate) decisions: DecisionService<dyn VersionStore>,
    pub(crate) orchestrator: Orchestrator<dyn VersionStore>,
    /// Handles batches posted to `/feed`.
    pub(crate) watcher: Arc<ChangeFeedWatcher>,
    pub(crate) rate_limiter: RateLimiter,
    /// `None` disables authentication on administrative routes.
    pub(crate) api_key: Option<String>,
}

impl AppState {
    pub(crate) fn new(
        store: Arc<dyn VersionStore>,
        watcher: Arc<ChangeFeedWatcher>,
        rate_limit: u64,
        api_key: Option<String>,
    ) -> Self {
        AppState {
            decisions: DecisionService::new(store.clone()),
            orchestrator: Orchestrator::new(store.clone()),
            store,
            watcher,
            rate_limiter: RateLimiter::new(rate_limit),
            api_key,
        }
    }
}
