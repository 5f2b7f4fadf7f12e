//! Decision request notifications.
//!
//! [`Notifier`] turns a `(prompt_id, version)` pair into a
//! [`NotificationMessage`] carrying two [`DecisionLinks`] and publishes it
//! once to a [`Topic`]. The topic owns fan-out to the distribution list.

mod topic;

use std::sync::Arc;

use serde::Serialize;
use url::Url;

pub use topic::{
    DistributionList, LogTopic, PublishReceipt, RecordingTopic, Topic, WebhookTopic,
    DEFAULT_DELIVERY_TIMEOUT,
};

/// Default subject prefix for decision request messages.
pub const DEFAULT_SUBJECT_PREFIX: &str = "Prompt approval request";

/// Longest prompt excerpt included in a message body, in characters.
const MAX_EXCERPT_CHARS: usize = 500;

// ──────────────────────────────────────────────
// NotifyError
// ──────────────────────────────────────────────

/// Errors raised while building or delivering a decision request.
///
/// None of these are fatal to feed processing: the watcher logs them and
/// moves on.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The configured public base URL cannot carry decision links.
    #[error("invalid decision link base '{base}': {reason}")]
    InvalidLink { base: String, reason: String },

    /// Every subscriber rejected the message.
    #[error("delivery failed for all {attempted} subscriber(s): {failures:?}")]
    Delivery {
        attempted: usize,
        failures: Vec<String>,
    },

    /// The topic itself is unavailable (task failure, closed channel, ...).
    #[error("topic '{topic}' unavailable: {reason}")]
    Unavailable { topic: String, reason: String },
}

// ──────────────────────────────────────────────
// DecisionLinks
// ──────────────────────────────────────────────

/// The pair of locators a reviewer can follow for one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionLinks {
    pub approve_url: String,
    pub reject_url: String,
}

impl DecisionLinks {
    /// Build `{base}/approve?promptId=..&version=..` and its `reject`
    /// counterpart. Query values are percent-encoded.
    pub fn build(base: &Url, prompt_id: &str, version: &str) -> Result<Self, NotifyError> {
        Ok(DecisionLinks {
            approve_url: decision_url(base, "approve", prompt_id, version)?,
            reject_url: decision_url(base, "reject", prompt_id, version)?,
        })
    }
}

fn decision_url(
    base: &Url,
    action: &str,
    prompt_id: &str,
    version: &str,
) -> Result<String, NotifyError> {
    let mut dir = base.clone();
    dir.set_query(None);
    dir.set_fragment(None);
    if !dir.path().ends_with('/') {
        let path = format!("{}/", dir.path());
        dir.set_path(&path);
    }
    let mut url = dir.join(action).map_err(|e| NotifyError::InvalidLink {
        base: base.to_string(),
        reason: e.to_string(),
    })?;
    url.query_pairs_mut()
        .append_pair("promptId", prompt_id)
        .append_pair("version", version);
    Ok(url.into())
}

/// Parse and check a public base URL for decision links.
pub fn parse_base_url(raw: &str) -> Result<Url, NotifyError> {
    let url = Url::parse(raw).map_err(|e| NotifyError::InvalidLink {
        base: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(NotifyError::InvalidLink {
            base: raw.to_string(),
            reason: "expected an http(s) URL".to_string(),
        });
    }
    Ok(url)
}

// ──────────────────────────────────────────────
// NotificationMessage
// ──────────────────────────────────────────────

/// A single decision request, as published to the topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    pub prompt_id: String,
    pub version: String,
    #[serde(flatten)]
    pub links: DecisionLinks,
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_EXCERPT_CHARS).collect();
    out.push_str("...");
    out
}

fn render_body(
    prompt_id: &str,
    version: &str,
    prompt_text: Option<&str>,
    links: &DecisionLinks,
) -> String {
    let mut body = String::new();
    body.push_str("A new prompt version is waiting for review.\n\n");
    body.push_str(&format!("Prompt ID: {}\n", prompt_id));
    body.push_str(&format!("Version:   {}\n", version));
    if let Some(text) = prompt_text.filter(|t| !t.trim().is_empty()) {
        body.push_str("\nPrompt text:\n");
        body.push_str(&excerpt(text));
        body.push('\n');
    }
    body.push_str(&format!("\nApprove: {}\n", links.approve_url));
    body.push_str(&format!("Reject:  {}\n", links.reject_url));
    body
}

// ──────────────────────────────────────────────
// Notifier
// ──────────────────────────────────────────────

/// Builds decision requests and publishes them to a topic.
pub struct Notifier {
    base_url: Url,
    subject_prefix: String,
    topic: Arc<dyn Topic>,
}

impl Notifier {
    pub fn new(base_url: &str, topic: Arc<dyn Topic>) -> Result<Self, NotifyError> {
        Ok(Notifier {
            base_url: parse_base_url(base_url)?,
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
            topic,
        })
    }

    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn topic_id(&self) -> &str {
        self.topic.topic_id()
    }

    /// Build the message for one version without sending it.
    pub fn compose(
        &self,
        prompt_id: &str,
        version: &str,
        prompt_text: Option<&str>,
    ) -> Result<NotificationMessage, NotifyError> {
        let links = DecisionLinks::build(&self.base_url, prompt_id, version)?;
        Ok(NotificationMessage {
            subject: format!("{}: {} version {}", self.subject_prefix, prompt_id, version),
            body: render_body(prompt_id, version, prompt_text, &links),
            prompt_id: prompt_id.to_string(),
            version: version.to_string(),
            links,
        })
    }

    /// Publish one decision request for `(prompt_id, version)`.
    ///
    /// Exactly one publish per call; no retry and no delivery tracking.
    pub async fn notify(
        &self,
        prompt_id: &str,
        version: &str,
        prompt_text: Option<&str>,
    ) -> Result<PublishReceipt, NotifyError> {
        let message = self.compose(prompt_id, version, prompt_text)?;
        self.topic.publish(&message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(raw: &str) -> Url {
        parse_base_url(raw).unwrap()
    }

    #[test]
    fn links_carry_both_parameters() {
        let links = DecisionLinks::build(&base("https://gate.example.com"), "p1", "1").unwrap();
        assert_eq!(
            links.approve_url,
            "https://gate.example.com/approve?promptId=p1&version=1"
        );
        assert_eq!(
            links.reject_url,
            "https://gate.example.com/reject?promptId=p1&version=1"
        );
    }

    #[test]
    fn links_keep_base_path_prefix() {
        let links =
            DecisionLinks::build(&base("https://api.example.com/prod"), "p1", "2").unwrap();
        assert_eq!(
            links.approve_url,
            "https://api.example.com/prod/approve?promptId=p1&version=2"
        );
        let links =
            DecisionLinks::build(&base("https://api.example.com/prod/"), "p1", "2").unwrap();
        assert_eq!(
            links.reject_url,
            "https://api.example.com/prod/reject?promptId=p1&version=2"
        );
    }

    #[test]
    fn link_values_are_percent_encoded() {
        let links =
            DecisionLinks::build(&base("http://localhost:8080"), "team/a b&c", "1.0").unwrap();
        assert_eq!(
            links.approve_url,
            "http://localhost:8080/approve?promptId=team%2Fa+b%26c&version=1.0"
        );
    }

    #[test]
    fn non_http_base_rejected() {
        assert!(matches!(
            parse_base_url("mailto:ops@example.com"),
            Err(NotifyError::InvalidLink { .. })
        ));
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn message_subject_and_body() {
        let topic = Arc::new(RecordingTopic::new());
        let notifier = Notifier::new("https://gate.example.com", topic).unwrap();
        let msg = notifier
            .compose("p1", "1", Some("Summarize: {{doc}}"))
            .unwrap();

        assert_eq!(msg.subject, "Prompt approval request: p1 version 1");
        assert!(msg.body.contains("Prompt ID: p1"));
        assert!(msg.body.contains("Version:   1"));
        assert!(msg.body.contains("Summarize: {{doc}}"));
        assert!(msg
            .body
            .contains("Approve: https://gate.example.com/approve?promptId=p1&version=1"));
        assert!(msg
            .body
            .contains("Reject:  https://gate.example.com/reject?promptId=p1&version=1"));
    }

    #[test]
    fn body_omits_missing_text() {
        let topic = Arc::new(RecordingTopic::new());
        let notifier = Notifier::new("https://gate.example.com", topic).unwrap();
        let msg = notifier.compose("p1", "1", None).unwrap();
        assert!(!msg.body.contains("Prompt text:"));
    }

    #[test]
    fn long_text_is_truncated() {
        let long = "x".repeat(MAX_EXCERPT_CHARS + 50);
        let out = excerpt(&long);
        assert_eq!(out.chars().count(), MAX_EXCERPT_CHARS + 3);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn custom_subject_prefix() {
        let topic = Arc::new(RecordingTopic::new());
        let notifier = Notifier::new("https://gate.example.com", topic)
            .unwrap()
            .with_subject_prefix("[review]");
        let msg = notifier.compose("p1", "3", None).unwrap();
        assert_eq!(msg.subject, "[review]: p1 version 3");
    }

    #[test]
    fn message_json_flattens_links() {
        let topic = Arc::new(RecordingTopic::new());
        let notifier = Notifier::new("https://gate.example.com", topic).unwrap();
        let json = serde_json::to_value(notifier.compose("p1", "1", None).unwrap()).unwrap();
        assert_eq!(json["promptId"], "p1");
        assert_eq!(
            json["approveUrl"],
            "https://gate.example.com/approve?promptId=p1&version=1"
        );
        assert!(json.get("links").is_none());
    }

    #[tokio::test]
    async fn notify_publishes_once() {
        let topic = Arc::new(RecordingTopic::new());
        let notifier = Notifier::new("https://gate.example.com", topic.clone()).unwrap();
        notifier.notify("p1", "1", None).await.unwrap();
        let sent = topic.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].prompt_id, "p1");
    }
}
