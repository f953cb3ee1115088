//! Runtime configuration.
//!
//! ```
//! use json_mutator::SessionConfig;
//!
//! let config = SessionConfig::from_toml_str(r#"
//!     identity = "editor-1"
//!     command_capacity = 16
//!
//!     [retry]
//!     max_retries = 2
//!     initial_delay_ms = 10
//! "#).unwrap();
//! assert_eq!(config.identity.as_deref(), Some("editor-1"));
//! assert_eq!(config.event_capacity, 256);
//! assert_eq!(config.retry.max_retries, Some(2));
//! ```

use serde::Deserialize;
use thiserror::Error;

use crate::sync::retry::RetryConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Item key generation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyConfig {
    /// Hex characters per key.
    #[serde(default = "default_key_length")]
    pub length: usize,
    /// Fixed seed for reproducible keys. Random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_key_length() -> usize {
    12
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            length: default_key_length(),
            seed: None,
        }
    }
}

/// Configuration for a document session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Identity stamped on locally submitted transactions. Remote events
    /// carrying the same identity are reported as local. Generated when absent.
    #[serde(default)]
    pub identity: Option<String>,

    /// Bounded command queue between handles and the session task.
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,

    /// Broadcast buffer for session events. Slow subscribers lag past this.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Backoff for transient submission failures.
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub keys: KeyConfig,
}

fn default_command_capacity() -> usize {
    64
}

fn default_event_capacity() -> usize {
    256
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity: None,
            command_capacity: default_command_capacity(),
            event_capacity: default_event_capacity(),
            retry: RetryConfig::default(),
            keys: KeyConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.retry.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
