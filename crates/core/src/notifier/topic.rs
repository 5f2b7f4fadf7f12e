//! Topic implementations: where a decision request goes once it is built.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{NotificationMessage, NotifyError};

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishReceipt {
    /// Subscribers the message was handed to.
    pub delivered: usize,
    /// Subscribers that failed. Non-zero only for partial failures.
    pub failed: usize,
}

/// A pub/sub topic that fans a message out to its subscribers.
#[async_trait]
pub trait Topic: Send + Sync {
    /// Publish one message. Fails only when nobody could be reached.
    async fn publish(&self, message: &NotificationMessage) -> Result<PublishReceipt, NotifyError>;

    /// Identifier for logs.
    fn topic_id(&self) -> &str;
}

// ──────────────────────────────────────────────
// DistributionList
// ──────────────────────────────────────────────

/// The current set of subscriber endpoints.
#[derive(Debug, Default)]
pub struct DistributionList {
    endpoints: RwLock<BTreeSet<String>>,
}

impl DistributionList {
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DistributionList {
            endpoints: RwLock::new(endpoints.into_iter().map(Into::into).collect()),
        }
    }

    /// Returns false if the endpoint was already subscribed.
    pub async fn subscribe(&self, endpoint: impl Into<String>) -> bool {
        self.endpoints.write().await.insert(endpoint.into())
    }

    /// Returns false if the endpoint was not subscribed.
    pub async fn unsubscribe(&self, endpoint: &str) -> bool {
        self.endpoints.write().await.remove(endpoint)
    }

    pub async fn subscribers(&self) -> Vec<String> {
        self.endpoints.read().await.iter().cloned().collect()
    }
}

// ──────────────────────────────────────────────
// WebhookTopic
// ──────────────────────────────────────────────

/// Per-subscriber bound on one delivery, connect through response.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Topic that POSTs the message as JSON to every subscriber URL.
///
/// Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking`. Each
/// subscriber gets one attempt, bounded by the delivery timeout, so a
/// subscriber that never answers costs at most that long.
pub struct WebhookTopic {
    topic_id: String,
    list: Arc<DistributionList>,
    auth_token: Option<String>,
    timeout: Duration,
}

impl WebhookTopic {
    pub fn new(topic_id: impl Into<String>, list: Arc<DistributionList>) -> Self {
        WebhookTopic {
            topic_id: topic_id.into(),
            list,
            auth_token: None,
            timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send `Authorization: Bearer <token>` with every delivery.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

#[async_trait]
impl Topic for WebhookTopic {
    async fn publish(&self, message: &NotificationMessage) -> Result<PublishReceipt, NotifyError> {
        let subscribers = self.list.subscribers().await;
        if subscribers.is_empty() {
            tracing::warn!(topic = %self.topic_id, "no subscribers; decision request not delivered");
            return Ok(PublishReceipt::default());
        }

        let message = message.clone();
        let auth_token = self.auth_token.clone();
        let attempted = subscribers.len();
        let timeout = self.timeout;

        let failures = tokio::task::spawn_blocking(move || {
            let agent: ureq::Agent = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build()
                .into();
            let mut failures = Vec::new();
            for endpoint in &subscribers {
                let mut request = agent.post(endpoint);
                if let Some(ref token) = auth_token {
                    request = request.header("Authorization", &format!("Bearer {}", token));
                }
                if let Err(e) = request.send_json(&message) {
                    failures.push(format!("{}: {}", endpoint, e));
                }
            }
            failures
        })
        .await
        .map_err(|e| NotifyError::Unavailable {
            topic: self.topic_id.clone(),
            reason: format!("task join error: {}", e),
        })?;

        if failures.len() == attempted {
            return Err(NotifyError::Delivery {
                attempted,
                failures,
            });
        }
        for failure in &failures {
            tracing::warn!(topic = %self.topic_id, failure = %failure, "subscriber delivery failed");
        }
        Ok(PublishReceipt {
            delivered: attempted - failures.len(),
            failed: failures.len(),
        })
    }

    fn topic_id(&self) -> &str {
        &self.topic_id
    }
}

// ──────────────────────────────────────────────
// LogTopic
// ──────────────────────────────────────────────

/// Topic that writes each message to the log. Useful for local runs where
/// the operator copies links out of the server output.
pub struct LogTopic {
    topic_id: String,
}

impl LogTopic {
    pub fn new(topic_id: impl Into<String>) -> Self {
        LogTopic {
            topic_id: topic_id.into(),
        }
    }
}

#[async_trait]
impl Topic for LogTopic {
    async fn publish(&self, message: &NotificationMessage) -> Result<PublishReceipt, NotifyError> {
        tracing::info!(
            topic = %self.topic_id,
            prompt_id = %message.prompt_id,
            version = %message.version,
            subject = %message.subject,
            approve = %message.links.approve_url,
            reject = %message.links.reject_url,
            "decision request"
        );
        Ok(PublishReceipt {
            delivered: 1,
            failed: 0,
        })
    }

    fn topic_id(&self) -> &str {
        &self.topic_id
    }
}

// ──────────────────────────────────────────────
// RecordingTopic
// ──────────────────────────────────────────────

/// In-memory topic that keeps every published message. Can be switched into
/// a failing mode to exercise error paths.
#[derive(Debug, Default)]
pub struct RecordingTopic {
    messages: Mutex<Vec<NotificationMessage>>,
    failing: std::sync::atomic::AtomicBool,
}

impl RecordingTopic {
    pub fn new() -> Self {
        Self::default()
    }

    /// A topic whose publishes fail until [`set_failing(false)`](Self::set_failing).
    pub fn failing() -> Self {
        let topic = Self::default();
        topic.set_failing(true);
        topic
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Messages published so far, in order.
    pub fn messages(&self) -> Vec<NotificationMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Topic for RecordingTopic {
    async fn publish(&self, message: &NotificationMessage) -> Result<PublishReceipt, NotifyError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(NotifyError::Delivery {
                attempted: 1,
                failures: vec!["recording topic set to fail".to_string()],
            });
        }
        let mut messages = self
            .messages
            .lock()
            .map_err(|_| NotifyError::Unavailable {
                topic: "recording".to_string(),
                reason: "lock poisoned".to_string(),
            })?;
        messages.push(message.clone());
        Ok(PublishReceipt {
            delivered: 1,
            failed: 0,
        })
    }

    fn topic_id(&self) -> &str {
        "recording"
    }
}
