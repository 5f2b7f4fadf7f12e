use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Approval status of a prompt version.
///
/// `Pending` is the only non-terminal status. A record leaves `Pending`
/// exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// What a store must do when asked to move a record to a requested status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Write the new status.
    Apply,
    /// The record already has the requested status; leave it alone.
    Unchanged,
    /// The record is terminal and the request disagrees with it.
    Conflict,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "Pending",
            ApprovalStatus::Approved => "Approved",
            ApprovalStatus::Rejected => "Rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    /// Classify a request to move from `self` to `requested`.
    ///
    /// ```text
    /// Pending  -> Approved | Rejected   Apply
    /// X        -> X                     Unchanged
    /// Approved -> Rejected (and back)   Conflict
    /// terminal -> Pending               Conflict
    /// ```
    pub fn transition_to(self, requested: ApprovalStatus) -> Transition {
        if self == requested {
            Transition::Unchanged
        } else if self == ApprovalStatus::Pending {
            Transition::Apply
        } else {
            Transition::Conflict
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    /// Accepts the canonical spelling and lower-case variants (`approved`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            _ => Err(format!("unknown approval status '{}'", s)),
        }
    }
}

/// Composite primary key of a version record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionKey {
    pub prompt_id: String,
    pub version: String,
}

impl VersionKey {
    pub fn new(prompt_id: impl Into<String>, version: impl Into<String>) -> Self {
        VersionKey {
            prompt_id: prompt_id.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prompt_id, self.version)
    }
}

/// One row per (prompt_id, version).
///
/// Everything except `status` (and the `updated_at` stamp that follows it)
/// is fixed at insert time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub prompt_id: String,
    pub version: String,
    pub prompt_text: String,
    pub status: ApprovalStatus,
    /// RFC 3339 timestamp string.
    pub created_at: String,
    /// RFC 3339 timestamp string.
    pub updated_at: String,
}

impl VersionRecord {
    /// A fresh `Pending` record stamped with the current time.
    pub fn pending(
        prompt_id: impl Into<String>,
        version: impl Into<String>,
        prompt_text: impl Into<String>,
    ) -> Self {
        let now = now_rfc3339();
        VersionRecord {
            prompt_id: prompt_id.into(),
            version: version.into(),
            prompt_text: prompt_text.into(),
            status: ApprovalStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn key(&self) -> VersionKey {
        VersionKey::new(self.prompt_id.clone(), self.version.clone())
    }
}

/// Result of a conditional status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Status before the update was applied.
    pub previous: ApprovalStatus,
    /// Status after the update.
    pub current: ApprovalStatus,
    /// False when the request was an idempotent replay.
    pub changed: bool,
}

/// Current UTC time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
