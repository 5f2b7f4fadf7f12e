use crate::record::ApprovalStatus;

/// All errors that can be returned by a VersionStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A record with this (prompt_id, version) already exists.
    #[error("version already registered: {prompt_id}/{version}")]
    DuplicateKey { prompt_id: String, version: String },

    /// No record with the given (prompt_id, version).
    #[error("version not found: {prompt_id}/{version}")]
    NotFound { prompt_id: String, version: String },

    /// The record is already in a terminal status different from the one requested.
    /// The record is left unchanged.
    #[error(
        "conflicting decision on {prompt_id}/{version}: status is {current}, requested {requested}"
    )]
    Conflict {
        prompt_id: String,
        version: String,
        current: ApprovalStatus,
        requested: ApprovalStatus,
    },

    /// One of the key parts is empty.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(prompt_id: &str, version: &str) -> Self {
        StorageError::NotFound {
            prompt_id: prompt_id.to_string(),
            version: version.to_string(),
        }
    }

    pub fn duplicate(prompt_id: &str, version: &str) -> Self {
        StorageError::DuplicateKey {
            prompt_id: prompt_id.to_string(),
            version: version.to_string(),
        }
    }
}
