//! Session timer configuration.
//!
//! All intervals are in milliseconds. A missing field falls back to its
//! default, so an empty TOML document is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, SessionError};

/// Timer intervals that drive retries, acks and farewells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Keep-alive interval after our last send.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    /// Delay before acknowledging with an empty message.
    #[serde(default = "default_ack_interval")]
    pub ack_interval_ms: u64,
    /// How long a peer may go without acknowledging a message.
    #[serde(default = "default_consistency_failure_interval")]
    pub consistency_failure_interval_ms: u64,
    /// How long the relay may take to echo our own message.
    #[serde(default = "default_send_receive_interval")]
    pub send_receive_interval_ms: u64,
    /// Upper bound on a farewell before we leave regardless.
    #[serde(default = "default_farewell_deadline")]
    pub farewell_deadline_ms: u64,
}

fn default_heartbeat_interval() -> u64 {
    30_000
}

fn default_ack_interval() -> u64 {
    5_000
}

fn default_consistency_failure_interval() -> u64 {
    20_000
}

fn default_send_receive_interval() -> u64 {
    10_000
}

fn default_farewell_deadline() -> u64 {
    60_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval(),
            ack_interval_ms: default_ack_interval(),
            consistency_failure_interval_ms: default_consistency_failure_interval(),
            send_receive_interval_ms: default_send_receive_interval(),
            farewell_deadline_ms: default_farewell_deadline(),
        }
    }
}

impl SessionConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SessionError::Config(e.to_string()))
    }

    /// Load configuration from a file, falling back to defaults if the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn ack_interval(&self) -> Duration {
        Duration::from_millis(self.ack_interval_ms)
    }

    pub fn consistency_failure_interval(&self) -> Duration {
        Duration::from_millis(self.consistency_failure_interval_ms)
    }

    pub fn send_receive_interval(&self) -> Duration {
        Duration::from_millis(self.send_receive_interval_ms)
    }

    pub fn farewell_deadline(&self) -> Duration {
        Duration::from_millis(self.farewell_deadline_ms)
    }
}
