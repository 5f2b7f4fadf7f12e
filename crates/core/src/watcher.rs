//! Change feed watcher: one decision request per inserted version.

use std::sync::Arc;

use promptgate_storage::{ChangeEvent, ChangeKind, FeedReceiver};
use serde::Serialize;

use crate::notifier::Notifier;

/// What the watcher did with a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Insert event; the notifier accepted the request.
    Notified,
    /// Insert event; the notifier failed. Logged and dropped.
    NotifyFailed(String),
    /// Not an insert.
    Ignored(ChangeKind),
}

/// Counters for a run over several events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub inserts: usize,
    pub notified: usize,
    pub failed: usize,
    pub ignored: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &WatchOutcome) {
        match outcome {
            WatchOutcome::Notified => {
                self.inserts += 1;
                self.notified += 1;
            }
            WatchOutcome::NotifyFailed(_) => {
                self.inserts += 1;
                self.failed += 1;
            }
            WatchOutcome::Ignored(_) => self.ignored += 1,
        }
    }
}

/// Consumes change events and asks the notifier for a decision request on
/// every `INSERT`.
///
/// Each delivered insert gets exactly one notify attempt. Failures never
/// stop processing: redelivery, if any, is the feed's business.
pub struct ChangeFeedWatcher {
    notifier: Arc<Notifier>,
}

impl ChangeFeedWatcher {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        ChangeFeedWatcher { notifier }
    }

    pub async fn handle_event(&self, event: &ChangeEvent) -> WatchOutcome {
        if event.kind != ChangeKind::Insert {
            tracing::debug!(
                event_id = %event.event_id,
                kind = ?event.kind,
                "ignoring non-insert change"
            );
            return WatchOutcome::Ignored(event.kind);
        }

        let prompt_id = &event.key.prompt_id;
        let version = &event.key.version;
        match self
            .notifier
            .notify(prompt_id, version, event.prompt_text.as_deref())
            .await
        {
            Ok(receipt) => {
                tracing::info!(
                    event_id = %event.event_id,
                    prompt_id = %prompt_id,
                    version = %version,
                    delivered = receipt.delivered,
                    "decision request published"
                );
                WatchOutcome::Notified
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    prompt_id = %prompt_id,
                    version = %version,
                    error = %e,
                    "decision request failed; continuing"
                );
                WatchOutcome::NotifyFailed(e.to_string())
            }
        }
    }

    /// Process events in order.
    pub async fn handle_batch(&self, events: &[ChangeEvent]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for event in events {
            summary.record(&self.handle_event(event).await);
        }
        summary
    }

    /// Drain an in-process feed until every sender is dropped.
    pub async fn run(&self, mut feed: FeedReceiver) -> BatchSummary {
        tracing::info!(topic = %self.notifier.topic_id(), "change feed watcher started");
        let mut summary = BatchSummary::default();
        while let Some(event) = feed.recv().await {
            summary.record(&self.handle_event(&event).await);
        }
        tracing::info!(
            inserts = summary.inserts,
            notified = summary.notified,
            failed = summary.failed,
            "change feed closed; watcher stopped"
        );
        summary
    }
}
