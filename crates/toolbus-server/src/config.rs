//! Server configuration.

use std::time::Duration;

/// Configuration for a [`ToolServer`](crate::ToolServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server name, used in logs and errors.
    pub name: String,
    /// Server version string.
    pub version: String,
    /// Advisory connection limit; recorded in state, not enforced here.
    pub max_connections: usize,
    /// Per-call execution budget; advisory for tool implementations.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "toolbus-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            max_connections: 64,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Create a configuration with the given name and otherwise default values.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
