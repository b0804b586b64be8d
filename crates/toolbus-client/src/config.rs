//! Client configuration.

use std::time::Duration;

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Client name, used in logs.
    pub name: String,
    /// Client version string.
    pub version: String,
    /// Upper bound on retries for connecting and for tool calls. Each policy
    /// counts its own attempts.
    pub max_retries: u32,
    /// Base delay for linear retry backoff (`attempt × base`).
    pub retry_base_delay: Duration,
    /// How long cached resources and prompt templates stay fresh.
    pub cache_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "toolbus-client".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            cache_ttl: Duration::from_secs(300),
        }
    }
}

impl ClientConfig {
    /// Create a configuration with the given name and otherwise default values.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
