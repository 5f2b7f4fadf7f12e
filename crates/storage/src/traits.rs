use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{ApprovalStatus, StatusUpdate, VersionRecord};

/// The storage trait for promptgate version backends.
///
/// A `VersionStore` holds one [`VersionRecord`] per `(prompt_id, version)`.
/// Records are inserted once and afterwards only their `status` moves, and
/// only out of `Pending`.
///
/// ## Conditional update
///
/// `update_status` is the single concurrency primitive of the system. It must
/// behave as an atomic compare-and-set on `status`, keyed by
/// `(prompt_id, version)`:
///
/// - `Pending` -> requested terminal status: written, `changed = true`
/// - current == requested: nothing written, `changed = false`
/// - terminal current != requested: `Err(StorageError::Conflict)`, row untouched
/// - missing row: `Err(StorageError::NotFound)`
///
/// When two callers race on the same `Pending` row, exactly one write lands.
/// The other observes either the idempotent success (same decision) or a
/// `Conflict` (different decision).
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait VersionStore: Send + Sync + 'static {
    /// Insert a new record.
    ///
    /// Returns `Err(StorageError::DuplicateKey)` if the key already exists and
    /// `Err(StorageError::InvalidKey)` if either key part is empty.
    async fn put(&self, record: VersionRecord) -> Result<(), StorageError>;

    /// Conditionally move a record to `new_status`. See the trait docs.
    async fn update_status(
        &self,
        prompt_id: &str,
        version: &str,
        new_status: ApprovalStatus,
    ) -> Result<StatusUpdate, StorageError>;

    /// Read one record.
    ///
    /// Returns `Err(StorageError::NotFound)` if the record does not exist.
    async fn get(&self, prompt_id: &str, version: &str) -> Result<VersionRecord, StorageError>;

    /// List all versions of a prompt, optionally filtered by status,
    /// ordered by version string.
    async fn list(
        &self,
        prompt_id: &str,
        status_filter: Option<ApprovalStatus>,
    ) -> Result<Vec<VersionRecord>, StorageError>;
}

/// Reject blank key parts before they reach a backend.
///
/// Whitespace-only counts as blank: the decision endpoint refuses such
/// values, so a record stored under one could never leave `Pending`.
pub fn validate_key(prompt_id: &str, version: &str) -> Result<(), StorageError> {
    if prompt_id.trim().is_empty() {
        return Err(StorageError::InvalidKey("promptId must not be blank".into()));
    }
    if version.trim().is_empty() {
        return Err(StorageError::InvalidKey("version must not be blank".into()));
    }
    Ok(())
}
