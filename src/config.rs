//! Session configuration.
//!
//! Every session config embeds a [`ClientConfig`] describing how to reach
//! the broker. Configs can be built in code or loaded from TOML:
//!
//! ```toml
//! hosts = ["10.0.0.1:9999", "10.0.0.2:9999"]
//! connect_timeout = "2s"
//! max_line_length = 65536
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Mark, OffsetStrategy};

/// Default broker address.
pub const DEFAULT_HOST: &str = "127.0.0.1:9999";

/// Default maximum line length (64 KiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// How to reach a broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Candidate hosts, attempted strictly in order.
    pub hosts: Vec<String>,
    /// Upper bound on each dial attempt. `None` waits as long as the OS does.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
    /// Disable Nagle's algorithm on TCP connections.
    pub nodelay: bool,
    /// Longest line accepted from the broker, in bytes.
    pub max_line_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hosts: vec![DEFAULT_HOST.to_string()],
            connect_timeout: None,
            nodelay: true,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ClientConfig {
    /// Create a config for an ordered list of hosts.
    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the per-host dial timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Load a config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {:?}: {}", path, e))
        })?;
        Self::parse_str(&contents)
    }

    /// Parse a config from a TOML string.
    pub fn parse_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Check that the config can be used to open a session.
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(Error::Config("host list cannot be empty".to_string()));
        }
        if self.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(Error::Config("host entries cannot be blank".to_string()));
        }
        if self.max_line_length == 0 {
            return Err(Error::Config("max_line_length cannot be 0".to_string()));
        }
        Ok(())
    }
}

/// Tail a topic from a compound mark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Broker connection settings.
    #[serde(flatten)]
    pub client: ClientConfig,
    /// Reader identity; the broker keys the durable mark by it.
    pub id: String,
    /// Resume point.
    #[serde(default)]
    pub mark: Mark,
}

impl ReaderConfig {
    /// Create a reader config starting at `mark`.
    pub fn new(client: ClientConfig, id: impl Into<String>, mark: Mark) -> Self {
        Self {
            client,
            id: id.into(),
            mark,
        }
    }
}

/// Tail as a member of a consumer group using flat offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Broker connection settings.
    #[serde(flatten)]
    pub client: ClientConfig,
    /// Consumer identity.
    pub id: String,
    /// Consumer group the durable offset belongs to.
    pub group: String,
    /// Where to start when the group has no committed offset.
    #[serde(default)]
    pub offset: OffsetStrategy,
}

impl ConsumerConfig {
    /// Create a consumer config.
    pub fn new(
        client: ClientConfig,
        id: impl Into<String>,
        group: impl Into<String>,
        offset: OffsetStrategy,
    ) -> Self {
        Self {
            client,
            id: id.into(),
            group: group.into(),
            offset,
        }
    }
}

/// Append with compound marks returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Broker connection settings.
    #[serde(flatten)]
    pub client: ClientConfig,
}

/// Append with opaque ids returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Broker connection settings.
    #[serde(flatten)]
    pub client: ClientConfig,
}

/// Subscribe to consumer-group summaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Broker connection settings.
    #[serde(flatten)]
    pub client: ClientConfig,
}
