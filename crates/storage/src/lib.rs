pub mod conformance;
mod error;
mod feed;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use feed::{feed_channel, ChangeEvent, ChangeKind, FeedReceiver, FeedingStore};
pub use memory::InMemoryVersionStore;
pub use record::{
    now_rfc3339, ApprovalStatus, StatusUpdate, Transition, VersionKey, VersionRecord,
};
pub use traits::{validate_key, VersionStore};
