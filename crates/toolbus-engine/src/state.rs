//! Connection state model.

use serde::{Deserialize, Serialize};

/// The four connection lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No transport attached; the initial and post-`disconnect` state.
    Disconnected,
    /// A transport is attached and the session is being established
    /// (including during reconnect backoff windows).
    Connecting,
    /// The session is live: a message has been read or readiness observed.
    Connected,
    /// Terminal failure; automatic reconnection is exhausted and the
    /// transport has been detached. Only an explicit `connect` (with a fresh
    /// transport) leaves this state.
    Error,
}

/// Connection status plus an optional human-readable error description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Current lifecycle phase.
    pub status: ConnectionStatus,
    /// Present for `Connecting` (reconnect reason) and `Error` transitions;
    /// cleared by `disconnect`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionState {
    /// The initial state of a freshly created engine.
    pub fn disconnected() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            error: None,
        }
    }

    /// Whether the session is live.
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::disconnected()
    }
}
