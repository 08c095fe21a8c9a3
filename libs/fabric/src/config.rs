use std::time::Duration;

use cmwlight_core::protocol::DEFAULT_VERSION;
use serde::{Deserialize, Serialize};

/// Client configuration
///
/// Every field has a default, so a partial document deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Protocol version announced in CLIENT_CONNECT
    pub version: String,
    /// Session id put in every request header; the client identity if unset
    pub session_id: Option<String>,
    /// Leading part of the diagnostic client identity
    pub identity_prefix: String,
    /// How often housekeeping emits a client heartbeat
    pub heartbeat_interval: Duration,
    /// Heartbeat intervals without server traffic before the peer counts as stalled
    pub heartbeat_allowed_missed: u32,
    /// Limit on waiting for SERVER_CONNECT_ACK
    pub connect_timeout: Option<Duration>,
    /// Limit on waiting for any other message
    pub receive_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            session_id: None,
            identity_prefix: "cmwlight-rs".to_string(),
            heartbeat_interval: Duration::from_millis(1000),
            heartbeat_allowed_missed: 3,
            connect_timeout: None,
            receive_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn identity_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.identity_prefix = prefix.into();
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn heartbeat_allowed_missed(mut self, missed: u32) -> Self {
        self.heartbeat_allowed_missed = missed;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }

    /// Silence after which the server is considered gone
    pub fn stall_after(&self) -> Duration {
        self.heartbeat_interval
            .saturating_mul(self.heartbeat_allowed_missed.max(1))
    }
}
