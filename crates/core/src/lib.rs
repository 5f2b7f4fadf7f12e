//! promptgate-core: manual approval gate for prompt versions.
//!
//! A new version row lands in a [`VersionStore`](promptgate_storage::VersionStore),
//! the change feed delivers an insert event, the [`ChangeFeedWatcher`] asks the
//! [`Notifier`] to publish a decision request with approve / reject links, a
//! human follows one of them, and the [`DecisionService`] applies the decision
//! with a single conditional update. The [`Orchestrator`] registers versions
//! and gates promotion on the resulting status.
//!
//! # Public API
//!
//! - [`ChangeFeedWatcher`] -- consumes change events, notifies on inserts
//! - [`StreamBatch`] -- decodes externally delivered change feed batches
//! - [`Notifier`], [`Topic`], [`DecisionLinks`] -- decision request delivery
//! - [`DecisionService`] -- approve / reject state machine
//! - [`Orchestrator`], [`PromotionTarget`] -- registration and promotion gate

/// Crate version reported by the health endpoint.
pub const PROMPTGATE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod decision;
pub mod notifier;
pub mod orchestrator;
pub mod stream;
pub mod watcher;

pub use decision::{Decision, DecisionError, DecisionRequest, DecisionResponse, DecisionService};
pub use notifier::{
    DecisionLinks, DistributionList, LogTopic, NotificationMessage, Notifier, NotifyError,
    PublishReceipt, RecordingTopic, Topic, WebhookTopic,
};
pub use orchestrator::{
    versioned_resource, Orchestrator, OrchestratorError, PromotionGate, PromotionOutcome,
    PromotionTarget,
};
pub use stream::{DecodedBatch, FeedError, StreamBatch};
pub use watcher::{BatchSummary, ChangeFeedWatcher, WatchOutcome};
