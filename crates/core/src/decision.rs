//! Approve / reject decisions for a single prompt version.
//!
//! ```text
//! Pending  --approve--> Approved   (terminal)
//! Pending  --reject --> Rejected   (terminal)
//! Approved --approve--> Approved   (no-op)
//! Rejected --reject --> Rejected   (no-op)
//! Approved --reject --> Conflict, record unchanged
//! Rejected --approve--> Conflict, record unchanged
//! missing  --either --> NotFound
//! ```
//!
//! The store's conditional update is the only synchronization. Two racing
//! decisions on the same `Pending` row resolve there: one applies, the other
//! sees either an idempotent success or a conflict.

use std::sync::Arc;

use promptgate_storage::{ApprovalStatus, StorageError, VersionStore};
use serde::{Deserialize, Serialize};

/// Which link the reviewer followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn target_status(self) -> ApprovalStatus {
        match self {
            Decision::Approve => ApprovalStatus::Approved,
            Decision::Reject => ApprovalStatus::Rejected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

/// Raw decision parameters as they arrive on a link's query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionRequest {
    #[serde(rename = "promptId", default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl DecisionRequest {
    pub fn new(prompt_id: impl Into<String>, version: impl Into<String>) -> Self {
        DecisionRequest {
            prompt_id: Some(prompt_id.into()),
            version: Some(version.into()),
        }
    }
}

/// Body returned to the reviewer after a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub prompt_id: String,
    pub version: String,
    pub status: ApprovalStatus,
    /// False when the decision was already recorded.
    #[serde(skip)]
    pub changed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("{0}")]
    BadRequest(String),

    #[error("no version {version} for prompt {prompt_id}")]
    NotFound { prompt_id: String, version: String },

    #[error("version {version} of prompt {prompt_id} is already {current}; cannot mark it {requested}")]
    Conflict {
        prompt_id: String,
        version: String,
        current: ApprovalStatus,
        requested: ApprovalStatus,
    },

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for DecisionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { prompt_id, version } => {
                DecisionError::NotFound { prompt_id, version }
            }
            StorageError::Conflict {
                prompt_id,
                version,
                current,
                requested,
            } => DecisionError::Conflict {
                prompt_id,
                version,
                current,
                requested,
            },
            StorageError::InvalidKey(msg) => DecisionError::BadRequest(msg),
            other => DecisionError::Storage(other),
        }
    }
}

/// Applies reviewer decisions to a version store.
pub struct DecisionService<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for DecisionService<S> {
    fn clone(&self) -> Self {
        DecisionService {
            store: self.store.clone(),
        }
    }
}

impl<S: VersionStore + ?Sized> DecisionService<S> {
    pub fn new(store: Arc<S>) -> Self {
        DecisionService { store }
    }

    /// Validate the raw parameters, then apply `decision`.
    pub async fn handle(
        &self,
        decision: Decision,
        request: &DecisionRequest,
    ) -> Result<DecisionResponse, DecisionError> {
        let prompt_id = required("promptId", request.prompt_id.as_deref())?;
        let version = required("version", request.version.as_deref())?;
        self.apply(decision, prompt_id, version).await
    }

    pub async fn handle_approve(
        &self,
        prompt_id: &str,
        version: &str,
    ) -> Result<DecisionResponse, DecisionError> {
        self.handle(Decision::Approve, &DecisionRequest::new(prompt_id, version))
            .await
    }

    pub async fn handle_reject(
        &self,
        prompt_id: &str,
        version: &str,
    ) -> Result<DecisionResponse, DecisionError> {
        self.handle(Decision::Reject, &DecisionRequest::new(prompt_id, version))
            .await
    }

    async fn apply(
        &self,
        decision: Decision,
        prompt_id: &str,
        version: &str,
    ) -> Result<DecisionResponse, DecisionError> {
        let target = decision.target_status();
        match self.store.update_status(prompt_id, version, target).await {
            Ok(update) => {
                if update.changed {
                    tracing::info!(
                        prompt_id = %prompt_id,
                        version = %version,
                        status = %update.current,
                        "decision recorded"
                    );
                } else {
                    tracing::debug!(
                        prompt_id = %prompt_id,
                        version = %version,
                        status = %update.current,
                        "decision already recorded"
                    );
                }
                Ok(DecisionResponse {
                    prompt_id: prompt_id.to_string(),
                    version: version.to_string(),
                    status: update.current,
                    changed: update.changed,
                })
            }
            Err(e) => {
                let err = DecisionError::from(e);
                tracing::warn!(
                    decision = decision.as_str(),
                    prompt_id = %prompt_id,
                    version = %version,
                    error = %err,
                    "decision refused"
                );
                Err(err)
            }
        }
    }
}

/// Whitespace-only values count as missing.
fn required<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str, DecisionError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(DecisionError::BadRequest(format!(
            "missing required parameter '{}'",
            name
        ))),
    }
}
