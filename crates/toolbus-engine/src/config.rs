//! Engine configuration.

use std::time::Duration;

/// Configuration for a [`ProtocolEngine`](crate::ProtocolEngine).
///
/// Constructed once at process start and passed in explicitly; there is no
/// ambient global configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long `connect` waits for the state to reach `Connected`.
    pub connect_timeout: Duration,
    /// Interval between heartbeat timer ticks.
    pub health_check_interval: Duration,
    /// Inbound silence threshold after which a tick sends a probe.
    pub message_timeout: Duration,
    /// Upper bound on automatic reconnection attempts.
    pub max_reconnect_attempts: u32,
    /// Base delay for linear reconnect backoff (`attempt × base`).
    pub reconnect_base_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            health_check_interval: Duration::from_secs(30),
            message_timeout: Duration::from_secs(60),
            max_reconnect_attempts: 3,
            reconnect_base_delay: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.health_check_interval, Duration::from_secs(30));
        assert_eq!(config.message_timeout, Duration::from_secs(60));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_base_delay, Duration::from_secs(1));
    }
}
