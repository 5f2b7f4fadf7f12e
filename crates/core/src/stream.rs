//! Decoding of externally delivered change feed batches.
//!
//! The accepted shape is the record batch emitted by a table stream:
//!
//! ```json
//! {
//!   "Records": [
//!     {
//!       "eventID": "c81e728d9d4c2f636f067f89cc14862c",
//!       "eventName": "INSERT",
//!       "dynamodb": {
//!         "Keys": { "promptId": {"S": "p1"}, "version": {"S": "1"} },
//!         "NewImage": {
//!           "promptId": {"S": "p1"},
//!           "version": {"S": "1"},
//!           "promptText": {"S": "Summarize {{doc}}"},
//!           "status": {"S": "Pending"}
//!         }
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! Attribute values are typed wrappers; string (`S`) and number (`N`)
//! wrappers are read as strings. Records that cannot be turned into a
//! [`ChangeEvent`] are reported in [`DecodedBatch::skipped`] instead of
//! failing the whole batch.

use std::collections::BTreeMap;

use promptgate_storage::{ApprovalStatus, ChangeEvent, ChangeKind, VersionKey};
use serde::Deserialize;

/// Typed attribute map of a row image.
type AttributeMap = BTreeMap<String, serde_json::Value>;

/// Errors raised when the batch itself is unreadable.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("malformed change feed batch: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A batch of stream records as delivered by the table's change feed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<StreamRecord>,
}

/// One raw stream record.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamRecord {
    #[serde(rename = "eventID", default)]
    pub event_id: Option<String>,
    #[serde(rename = "eventName")]
    pub event_name: String,
    #[serde(default)]
    pub dynamodb: StreamPayload,
}

/// Key and image attributes of a stream record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamPayload {
    #[serde(rename = "Keys", default)]
    pub keys: AttributeMap,
    #[serde(rename = "NewImage", default)]
    pub new_image: Option<AttributeMap>,
}

/// Result of decoding a batch.
#[derive(Debug, Clone, Default)]
pub struct DecodedBatch {
    pub events: Vec<ChangeEvent>,
    /// Human-readable reasons for records that were dropped.
    pub skipped: Vec<String>,
}

impl StreamBatch {
    /// Parse a batch from JSON text.
    pub fn from_json(json: &str) -> Result<Self, FeedError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Turn raw records into change events, keeping their order.
    pub fn into_events(self) -> DecodedBatch {
        let mut decoded = DecodedBatch::default();
        for (position, record) in self.records.into_iter().enumerate() {
            match record.into_event(position) {
                Ok(event) => decoded.events.push(event),
                Err(reason) => {
                    tracing::warn!(position, reason = %reason, "skipping change feed record");
                    decoded.skipped.push(reason);
                }
            }
        }
        decoded
    }
}

impl StreamRecord {
    fn into_event(self, position: usize) -> Result<ChangeEvent, String> {
        let label = self
            .event_id
            .unwrap_or_else(|| format!("record #{}", position));

        let kind = match self.event_name.as_str() {
            "INSERT" => ChangeKind::Insert,
            "MODIFY" => ChangeKind::Modify,
            "REMOVE" => ChangeKind::Remove,
            other => return Err(format!("{}: unknown eventName '{}'", label, other)),
        };

        // Inserts must carry the new image; other kinds can fall back to Keys.
        let image = self.dynamodb.new_image.as_ref();
        if kind == ChangeKind::Insert && image.is_none() {
            return Err(format!("{}: INSERT without NewImage", label));
        }
        let lookup = |name: &str| {
            image
                .and_then(|m| attribute_string(m, name))
                .or_else(|| attribute_string(&self.dynamodb.keys, name))
        };

        let prompt_id = lookup("promptId")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("{}: missing promptId", label))?;
        let version = lookup("version")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("{}: missing version", label))?;

        let prompt_text = image.and_then(|m| attribute_string(m, "promptText"));
        let status = image
            .and_then(|m| attribute_string(m, "status"))
            .and_then(|s| s.parse::<ApprovalStatus>().ok());

        Ok(ChangeEvent {
            event_id: label,
            kind,
            key: VersionKey::new(prompt_id, version),
            prompt_text,
            status,
        })
    }
}

/// Read a string-like attribute (`{"S": ".."}` or `{"N": ".."}`).
fn attribute_string(map: &AttributeMap, name: &str) -> Option<String> {
    let value = map.get(name)?;
    value
        .get("S")
        .or_else(|| value.get("N"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
