//! In-memory `VersionStore` for tests and ephemeral servers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::{
    now_rfc3339, ApprovalStatus, StatusUpdate, Transition, VersionKey, VersionRecord,
};
use crate::traits::{validate_key, VersionStore};

/// A `VersionStore` kept in a `BTreeMap` behind a tokio `RwLock`.
///
/// The write lock is held across the read-compare-write of `update_status`,
/// which makes each conditional update atomic per key.
#[derive(Debug, Default)]
pub struct InMemoryVersionStore {
    rows: RwLock<BTreeMap<VersionKey, VersionRecord>>,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    async fn put(&self, record: VersionRecord) -> Result<(), StorageError> {
        validate_key(&record.prompt_id, &record.version)?;
        let mut rows = self.rows.write().await;
        let key = record.key();
        if rows.contains_key(&key) {
            return Err(StorageError::duplicate(&key.prompt_id, &key.version));
        }
        rows.insert(key, record);
        Ok(())
    }

    async fn update_status(
        &self,
        prompt_id: &str,
        version: &str,
        new_status: ApprovalStatus,
    ) -> Result<StatusUpdate, StorageError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&VersionKey::new(prompt_id, version))
            .ok_or_else(|| StorageError::not_found(prompt_id, version))?;

        let previous = row.status;
        match previous.transition_to(new_status) {
            Transition::Apply => {
                row.status = new_status;
                row.updated_at = now_rfc3339();
                Ok(StatusUpdate {
                    previous,
                    current: new_status,
                    changed: true,
                })
            }
            Transition::Unchanged => Ok(StatusUpdate {
                previous,
                current: previous,
                changed: false,
            }),
            Transition::Conflict => Err(StorageError::Conflict {
                prompt_id: prompt_id.to_string(),
                version: version.to_string(),
                current: previous,
                requested: new_status,
            }),
        }
    }

    async fn get(&self, prompt_id: &str, version: &str) -> Result<VersionRecord, StorageError> {
        self.rows
            .read()
            .await
            .get(&VersionKey::new(prompt_id, version))
            .cloned()
            .ok_or_else(|| StorageError::not_found(prompt_id, version))
    }

    async fn list(
        &self,
        prompt_id: &str,
        status_filter: Option<ApprovalStatus>,
    ) -> Result<Vec<VersionRecord>, StorageError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| r.prompt_id == prompt_id)
            .filter(|r| status_filter.map_or(true, |s| r.status == s))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conformance() {
        let report =
            crate::conformance::run_conformance_suite(|| async { InMemoryVersionStore::new() })
                .await;
        assert!(report.failed == 0, "{report}");
    }
}
