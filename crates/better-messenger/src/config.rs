//! Client and server configuration with validation.
//!
//! All settings are explicit; there is no fallback to an ambient transport or
//! ambient defaults beyond the `Default` impls below.

use crate::ANY_ORIGIN;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-request timeout (default: 5s)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Destination hint passed with every post (default: any origin)
    pub target_origin: String,
    /// Handshake retry policy
    pub handshake: HandshakeConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            target_origin: ANY_ORIGIN.to_string(),
            handshake: HandshakeConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request timeout cannot be 0".into(),
            ));
        }

        if self.target_origin.is_empty() {
            return Err(ConfigError::InvalidOrigin(
                "target_origin cannot be empty".into(),
            ));
        }

        self.handshake.validate()
    }

    /// Override the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the destination hint.
    #[must_use]
    pub fn with_target_origin(mut self, origin: impl Into<String>) -> Self {
        self.target_origin = origin.into();
        self
    }
}

/// Handshake retry policy.
///
/// Attempt `i` (zero-based) waits `i * interval` before sending, so the
/// default policy waits 0, 300, 600, 900 and 1200 ms. Linear, not exponential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Number of attempts (default: 5)
    pub attempts: u32,
    /// Timeout of each attempt (default: 300ms)
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
    /// Back-off step between attempts (default: 300ms)
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            attempt_timeout: Duration::from_millis(300),
            interval: Duration::from_millis(300),
        }
    }
}

impl HandshakeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attempts == 0 {
            return Err(ConfigError::InvalidRetry(
                "handshake attempts cannot be 0".into(),
            ));
        }

        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "handshake attempt_timeout cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Delay before attempt `attempt` (zero-based).
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.interval.saturating_mul(attempt)
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Destination hint used when replying to a request's source
    pub reply_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            reply_origin: ANY_ORIGIN.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reply_origin.is_empty() {
            return Err(ConfigError::InvalidOrigin(
                "reply_origin cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid retry policy
    #[error("invalid retry policy: {0}")]
    InvalidRetry(String),
    /// Invalid origin hint
    #[error("invalid origin: {0}")]
    InvalidOrigin(String),
}
