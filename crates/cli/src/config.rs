//! Server configuration: TOML file, then `PROMPTGATE_*` environment overrides.
//!
//! # Example
//!
//! ```toml
//! [server]
//! port = 8080
//! public_base_url = "https://gate.example.com"
//! rate_limit = 60
//! api_key = "admin-secret"
//!
//! [store]
//! backend = "sqlite"
//! path = "promptgate.db"
//!
//! [notifier]
//! transport = "webhook"
//! subject_prefix = "Prompt approval request"
//! subscribers = ["https://hooks.example.com/approvals"]
//! timeout_secs = 10
//! ```
//!
//! Every section is optional.

use std::fmt;
use std::path::{Path, PathBuf};

use promptgate_core::notifier::{
    parse_base_url, DEFAULT_DELIVERY_TIMEOUT, DEFAULT_SUBJECT_PREFIX,
};
use serde::Deserialize;

pub(crate) const DEFAULT_PORT: u16 = 8080;
pub(crate) const DEFAULT_RATE_LIMIT: u64 = 60;
const DEFAULT_TOPIC: &str = "prompt-approvals";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("could not read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    pub(crate) server: ServerConfig,
    pub(crate) store: StoreConfig,
    pub(crate) notifier: NotifierConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ServerConfig {
    pub(crate) port: u16,
    /// Origin reviewers reach the decision endpoint on. Defaults to
    /// `http://localhost:<port>`.
    pub(crate) public_base_url: Option<String>,
    /// Requests per minute per client IP.
    pub(crate) rate_limit: u64,
    /// Required on administrative routes when set.
    pub(crate) api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: DEFAULT_PORT,
            public_base_url: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// `[store]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct StoreConfig {
    pub(crate) backend: StoreBackend,
    pub(crate) path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Transport {
    Webhook,
    #[default]
    Log,
}

/// `[notifier]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct NotifierConfig {
    pub(crate) transport: Transport,
    pub(crate) topic: String,
    pub(crate) subject_prefix: String,
    pub(crate) subscribers: Vec<String>,
    /// Bearer token sent to webhook subscribers.
    pub(crate) auth_token: Option<String>,
    /// Upper bound on one webhook delivery, per subscriber.
    pub(crate) timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        NotifierConfig {
            transport: Transport::Log,
            topic: DEFAULT_TOPIC.to_string(),
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
            subscribers: Vec::new(),
            auth_token: None,
            timeout_secs: DEFAULT_DELIVERY_TIMEOUT.as_secs(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl Config {
    /// Read `path` (or start from defaults), apply environment overrides and
    /// validate the result.
    pub(crate) fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Config::read(path)?,
            None => Config::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `PROMPTGATE_*` overrides. Empty values are ignored.
    pub(crate) fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(value) = get("PROMPTGATE_PORT") {
            self.server.port = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "PROMPTGATE_PORT",
                value,
            })?;
        }
        if let Some(value) = get("PROMPTGATE_RATE_LIMIT") {
            self.server.rate_limit =
                value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    var: "PROMPTGATE_RATE_LIMIT",
                    value,
                })?;
        }
        if let Some(value) = get("PROMPTGATE_PUBLIC_BASE_URL") {
            self.server.public_base_url = Some(value);
        }
        if let Some(value) = get("PROMPTGATE_API_KEY") {
            self.server.api_key = Some(value);
        }
        if let Some(value) = get("PROMPTGATE_DB_PATH") {
            self.store.backend = StoreBackend::Sqlite;
            self.store.path = Some(PathBuf::from(value));
        }
        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.server.rate_limit == 0 {
            return Err(ConfigError::Invalid(
                "server.rate_limit must be at least 1".into(),
            ));
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.path.is_none() {
            return Err(ConfigError::Invalid(
                "store.backend = \"sqlite\" requires store.path".into(),
            ));
        }
        if self.notifier.transport == Transport::Webhook && self.notifier.subscribers.is_empty() {
            return Err(ConfigError::Invalid(
                "notifier.transport = \"webhook\" requires at least one subscriber".into(),
            ));
        }
        if self.notifier.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "notifier.timeout_secs must be at least 1".into(),
            ));
        }
        if self.notifier.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("notifier.topic must not be empty".into()));
        }
        for endpoint in &self.notifier.subscribers {
            parse_base_url(endpoint).map_err(|e| {
                ConfigError::Invalid(format!("notifier.subscribers: {}", e))
            })?;
        }
        parse_base_url(&self.public_base_url())
            .map_err(|e| ConfigError::Invalid(format!("server.public_base_url: {}", e)))?;
        Ok(())
    }

    /// The configured public base URL, or the local default for the port.
    pub(crate) fn public_base_url(&self) -> String {
        match &self.server.public_base_url {
            Some(url) => url.clone(),
            None => format!("http://localhost:{}", self.server.port),
        }
    }
}

impl fmt::Display for Config {
    /// Resolved settings, one per line. The API key is never printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "port: {}", self.server.port)?;
        writeln!(f, "public_base_url: {}", self.public_base_url())?;
        writeln!(f, "rate_limit: {} requests/minute", self.server.rate_limit)?;
        writeln!(
            f,
            "api_key: {}",
            if self.server.api_key.is_some() {
                "set"
            } else {
                "none"
            }
        )?;
        match (self.store.backend, &self.store.path) {
            (StoreBackend::Sqlite, Some(path)) => writeln!(f, "store: sqlite ({})", path.display())?,
            (StoreBackend::Sqlite, None) => writeln!(f, "store: sqlite")?,
            (StoreBackend::Memory, _) => writeln!(f, "store: memory")?,
        }
        match self.notifier.transport {
            Transport::Log => writeln!(f, "notifier: log (topic {})", self.notifier.topic),
            Transport::Webhook => writeln!(
                f,
                "notifier: webhook (topic {}, {} subscriber(s), {}s timeout)",
                self.notifier.topic,
                self.notifier.subscribers.len(),
                self.notifier.timeout_secs
            ),
        }
    }
}
