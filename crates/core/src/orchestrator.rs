//! Version registration and the promotion gate.

use std::sync::Arc;

use async_trait::async_trait;
use promptgate_storage::{ApprovalStatus, StorageError, VersionRecord, VersionStore};

/// Reference handed to a promotion target: `<prompt_id>:<version>`.
pub fn versioned_resource(prompt_id: &str, version: &str) -> String {
    format!("{}:{}", prompt_id, version)
}

/// Downstream pipeline that receives approved versions.
#[async_trait]
pub trait PromotionTarget: Send + Sync {
    async fn promote(&self, resource: &str) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionGate {
    Promote,
    Hold(ApprovalStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionOutcome {
    Promoted { resource: String },
    Held(ApprovalStatus),
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("promotion of {resource} failed: {reason}")]
    Promotion { resource: String, reason: String },
}

/// Registers new versions and reads their status before promotion.
pub struct Orchestrator<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for Orchestrator<S> {
    fn clone(&self) -> Self {
        Orchestrator {
            store: self.store.clone(),
        }
    }
}

impl<S: VersionStore + ?Sized> Orchestrator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Orchestrator { store }
    }

    /// Insert a `Pending` record. The change feed takes it from there.
    pub async fn register_version(
        &self,
        prompt_id: &str,
        version: &str,
        prompt_text: &str,
    ) -> Result<VersionRecord, OrchestratorError> {
        let record = VersionRecord::pending(prompt_id, version, prompt_text);
        self.store.put(record.clone()).await?;
        tracing::info!(prompt_id = %prompt_id, version = %version, "version registered");
        Ok(record)
    }

    pub async fn read_status(
        &self,
        prompt_id: &str,
        version: &str,
    ) -> Result<ApprovalStatus, OrchestratorError> {
        Ok(self.store.get(prompt_id, version).await?.status)
    }

    pub async fn promotion_gate(
        &self,
        prompt_id: &str,
        version: &str,
    ) -> Result<PromotionGate, OrchestratorError> {
        Ok(match self.read_status(prompt_id, version).await? {
            ApprovalStatus::Approved => PromotionGate::Promote,
            other => PromotionGate::Hold(other),
        })
    }

    /// Hand the version to `target` if, and only if, it is approved.
    pub async fn promote_if_approved(
        &self,
        prompt_id: &str,
        version: &str,
        target: &dyn PromotionTarget,
    ) -> Result<PromotionOutcome, OrchestratorError> {
        match self.promotion_gate(prompt_id, version).await? {
            PromotionGate::Promote => {
                let resource = versioned_resource(prompt_id, version);
                target
                    .promote(&resource)
                    .await
                    .map_err(|reason| OrchestratorError::Promotion {
                        resource: resource.clone(),
                        reason,
                    })?;
                tracing::info!(resource = %resource, "version promoted");
                Ok(PromotionOutcome::Promoted { resource })
            }
            PromotionGate::Hold(status) => {
                tracing::info!(
                    prompt_id = %prompt_id,
                    version = %version,
                    status = %status,
                    "promotion held"
                );
                Ok(PromotionOutcome::Held(status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptgate_storage::InMemoryVersionStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingTarget {
        promoted: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl PromotionTarget for CapturingTarget {
        async fn promote(&self, resource: &str) -> Result<(), String> {
            if self.fail {
                return Err("pipeline offline".to_string());
            }
            self.promoted.lock().unwrap().push(resource.to_string());
            Ok(())
        }
    }

    fn orchestrator() -> (Orchestrator<InMemoryVersionStore>, Arc<InMemoryVersionStore>) {
        let store = Arc::new(InMemoryVersionStore::new());
        (Orchestrator::new(store.clone()), store)
    }

    #[tokio::test]
    async fn register_then_read_is_pending() {
        let (orch, _) = orchestrator();
        let record = orch.register_version("p1", "1", "hello").await.unwrap();
        assert_eq!(record.status, ApprovalStatus::Pending);
        assert_eq!(
            orch.read_status("p1", "1").await.unwrap(),
            ApprovalStatus::Pending
        );
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let (orch, _) = orchestrator();
        orch.register_version("p1", "1", "a").await.unwrap();
        let err = orch.register_version("p1", "1", "b").await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Storage(StorageError::DuplicateKey { .. })
        ));
    }

    #[tokio::test]
    async fn blank_ids_are_refused_like_decisions() {
        let (orch, store) = orchestrator();
        let err = orch.register_version(" ", "1", "a").await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Storage(StorageError::InvalidKey(_))
        ));
        assert!(store.list(" ", None).await.unwrap().is_empty());

        let decisions = crate::DecisionService::new(store.clone());
        assert!(matches!(
            decisions.handle_approve(" ", "1").await,
            Err(crate::DecisionError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn read_status_of_unknown_version() {
        let (orch, _) = orchestrator();
        let err = orch.read_status("nope", "1").await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Storage(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn pending_and_rejected_are_held() {
        let (orch, store) = orchestrator();
        orch.register_version("p1", "1", "a").await.unwrap();
        orch.register_version("p1", "2", "b").await.unwrap();
        store
            .update_status("p1", "2", ApprovalStatus::Rejected)
            .await
            .unwrap();

        let target = CapturingTarget::default();
        assert_eq!(
            orch.promote_if_approved("p1", "1", &target).await.unwrap(),
            PromotionOutcome::Held(ApprovalStatus::Pending)
        );
        assert_eq!(
            orch.promote_if_approved("p1", "2", &target).await.unwrap(),
            PromotionOutcome::Held(ApprovalStatus::Rejected)
        );
        assert!(target.promoted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn approved_version_is_promoted_with_resource_reference() {
        let (orch, store) = orchestrator();
        orch.register_version("p1", "3", "a").await.unwrap();
        store
            .update_status("p1", "3", ApprovalStatus::Approved)
            .await
            .unwrap();
        assert_eq!(
            orch.promotion_gate("p1", "3").await.unwrap(),
            PromotionGate::Promote
        );

        let target = CapturingTarget::default();
        let outcome = orch.promote_if_approved("p1", "3", &target).await.unwrap();
        assert_eq!(
            outcome,
            PromotionOutcome::Promoted {
                resource: "p1:3".to_string()
            }
        );
        assert_eq!(*target.promoted.lock().unwrap(), vec!["p1:3".to_string()]);
    }

    #[tokio::test]
    async fn target_failure_is_reported() {
        let (orch, store) = orchestrator();
        orch.register_version("p1", "1", "a").await.unwrap();
        store
            .update_status("p1", "1", ApprovalStatus::Approved)
            .await
            .unwrap();
        let target = CapturingTarget {
            fail: true,
            ..Default::default()
        };
        let err = orch
            .promote_if_approved("p1", "1", &target)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Promotion { ref resource, .. } if resource == "p1:1"));
    }
}
