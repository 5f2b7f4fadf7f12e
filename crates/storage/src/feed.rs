//! Change feed: ordered events describing writes to a `VersionStore`.
//!
//! [`FeedingStore`] wraps any backend and publishes one [`ChangeEvent`] per
//! committed write into a bounded channel. Consumers drain the matching
//! [`FeedReceiver`].

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::StorageError;
use crate::record::{ApprovalStatus, StatusUpdate, VersionKey, VersionRecord};
use crate::traits::VersionStore;

/// Operation tag of a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Modify,
    Remove,
}

/// One entry of the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Identifier assigned by the feed. Redeliveries keep the same id.
    pub event_id: String,
    pub kind: ChangeKind,
    pub key: VersionKey,
    /// Prompt text from the new row image, when the feed carried it.
    pub prompt_text: Option<String>,
    /// Status from the new row image, when the feed carried it.
    pub status: Option<ApprovalStatus>,
}

impl ChangeEvent {
    pub fn insert(event_id: impl Into<String>, record: &VersionRecord) -> Self {
        ChangeEvent {
            event_id: event_id.into(),
            kind: ChangeKind::Insert,
            key: record.key(),
            prompt_text: Some(record.prompt_text.clone()),
            status: Some(record.status),
        }
    }
}

/// Receiving half of an in-process change feed.
pub type FeedReceiver = mpsc::Receiver<ChangeEvent>;

/// Create a bounded change feed channel.
pub fn feed_channel(capacity: usize) -> (mpsc::Sender<ChangeEvent>, FeedReceiver) {
    mpsc::channel(capacity.max(1))
}

/// `VersionStore` decorator that publishes committed writes to a change feed.
///
/// - successful `put` -> `INSERT`
/// - `update_status` that changed the row -> `MODIFY`
/// - idempotent replays and failed writes publish nothing
///
/// Events are sent after the backend call returns, so a write is always
/// durable before anyone hears about it. If the receiver is gone the write
/// still succeeds and the lost event is logged.
pub struct FeedingStore<S> {
    inner: S,
    sender: mpsc::Sender<ChangeEvent>,
    sequence: AtomicU64,
}

impl<S: VersionStore> FeedingStore<S> {
    pub fn new(inner: S, sender: mpsc::Sender<ChangeEvent>) -> Self {
        FeedingStore {
            inner,
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    fn next_event_id(&self) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("evt-{n:08}")
    }

    async fn publish(&self, event: ChangeEvent) {
        let event_id = event.event_id.clone();
        if self.sender.send(event).await.is_err() {
            tracing::warn!(event_id = %event_id, "change feed receiver closed; event dropped");
        }
    }
}

#[async_trait]
impl<S: VersionStore> VersionStore for FeedingStore<S> {
    async fn put(&self, record: VersionRecord) -> Result<(), StorageError> {
        let mut event = ChangeEvent::insert(String::new(), &record);
        self.inner.put(record).await?;
        event.event_id = self.next_event_id();
        self.publish(event).await;
        Ok(())
    }

    async fn update_status(
        &self,
        prompt_id: &str,
        version: &str,
        new_status: ApprovalStatus,
    ) -> Result<StatusUpdate, StorageError> {
        let update = self
            .inner
            .update_status(prompt_id, version, new_status)
            .await?;
        if update.changed {
            let event = ChangeEvent {
                event_id: self.next_event_id(),
                kind: ChangeKind::Modify,
                key: VersionKey::new(prompt_id, version),
                prompt_text: None,
                status: Some(update.current),
            };
            self.publish(event).await;
        }
        Ok(update)
    }

    async fn get(&self, prompt_id: &str, version: &str) -> Result<VersionRecord, StorageError> {
        self.inner.get(prompt_id, version).await
    }

    async fn list(
        &self,
        prompt_id: &str,
        status_filter: Option<ApprovalStatus>,
    ) -> Result<Vec<VersionRecord>, StorageError> {
        self.inner.list(prompt_id, status_filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryVersionStore;

    #[tokio::test]
    async fn put_publishes_one_insert() {
        let (tx, mut rx) = feed_channel(8);
        let store = FeedingStore::new(InMemoryVersionStore::new(), tx);
        store
            .put(VersionRecord::pending("p1", "1", "hello"))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.key, VersionKey::new("p1", "1"));
        assert_eq!(event.prompt_text.as_deref(), Some("hello"));
        assert_eq!(event.status, Some(ApprovalStatus::Pending));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_put_publishes_nothing() {
        let (tx, mut rx) = feed_channel(8);
        let store = FeedingStore::new(InMemoryVersionStore::new(), tx);
        store
            .put(VersionRecord::pending("p1", "1", "a"))
            .await
            .unwrap();
        let _ = rx.recv().await.unwrap();

        let err = store
            .put(VersionRecord::pending("p1", "1", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn status_change_publishes_modify_but_replay_does_not() {
        let (tx, mut rx) = feed_channel(8);
        let store = FeedingStore::new(InMemoryVersionStore::new(), tx);
        store
            .put(VersionRecord::pending("p1", "1", "a"))
            .await
            .unwrap();
        let _ = rx.recv().await.unwrap();

        store
            .update_status("p1", "1", ApprovalStatus::Approved)
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Modify);
        assert_eq!(event.status, Some(ApprovalStatus::Approved));

        store
            .update_status("p1", "1", ApprovalStatus::Approved)
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_receiver_does_not_fail_writes() {
        let (tx, rx) = feed_channel(1);
        drop(rx);
        let store = FeedingStore::new(InMemoryVersionStore::new(), tx);
        store
            .put(VersionRecord::pending("p1", "1", "a"))
            .await
            .unwrap();
        assert_eq!(
            store.get("p1", "1").await.unwrap().status,
            ApprovalStatus::Pending
        );
    }

    #[test]
    fn change_kind_uses_stream_tags() {
        assert_eq!(
            serde_json::to_value(ChangeKind::Insert).unwrap(),
            serde_json::json!("INSERT")
        );
        assert_eq!(
            serde_json::from_value::<ChangeKind>(serde_json::json!("REMOVE")).unwrap(),
            ChangeKind::Remove
        );
    }
}
