//! Error taxonomy shared across the toolbus stack.

use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for toolbus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of component a registry entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    /// A named executable tool.
    Tool,
    /// A URI-addressed resource.
    Resource,
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool => write!(f, "tool"),
            Self::Resource => write!(f, "resource"),
        }
    }
}

/// Errors that can occur across the toolbus stack.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Transport attach, read, or write failure.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The initial connect did not reach `Connected` within the wait window.
    #[error("Connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    /// No tool with the given name is registered.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// A component with the same key is already registered.
    #[error("{kind} '{name}' is already registered")]
    DuplicateRegistration {
        /// Whether the clash was on a tool name or a resource URI.
        kind: ComponentKind,
        /// The conflicting key.
        name: String,
    },

    /// Arguments failed the tool's declared schema. Recoverable: the server
    /// framework reports this as a structured failure result, never raises it.
    #[error("Invalid arguments for tool '{0}'")]
    InvalidArguments(String),

    /// A tool's own internal failure, wrapped and relayed as a protocol
    /// `Error` message plus re-raised to the in-process caller.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The language-model backend could not be reached or returned garbage.
    /// Never retried by the tool-call retry policy.
    #[error("Language model request failed: {0}")]
    ModelBackend(String),

    /// Failed to serialize or deserialize a message or payload.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_names_the_component() {
        let err = Error::DuplicateRegistration {
            kind: ComponentKind::Tool,
            name: "echo".to_string(),
        };
        assert_eq!(err.to_string(), "tool 'echo' is already registered");
    }

    #[test]
    fn tool_not_found_matches_wire_message() {
        assert_eq!(
            Error::ToolNotFound("ghost".to_string()).to_string(),
            "Tool not found: ghost"
        );
    }
}
