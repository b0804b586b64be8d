//! Capability contracts for tools and resources.
//!
//! These traits are the explicit interfaces the server framework and protocol
//! engine dispatch through. A tool is a named, schema-described executable; a
//! resource is a URI-addressed fetchable. Lifecycle hooks that used to be
//! optional overrides are plain trait methods with default bodies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::Result;

/// Authentication context threaded through dispatch.
///
/// Carried for the benefit of tool implementations; nothing in the core stack
/// validates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthContext {
    /// Identity of the caller, if known.
    pub user_id: Option<String>,
    /// Permission strings granted to the caller.
    pub permissions: Vec<String>,
    /// Free-form metadata.
    pub metadata: HashMap<String, Value>,
}

/// One declared parameter of a tool's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name.
    pub name: String,
    /// Type name ("string", "number", ...), as presented to the model.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable description.
    pub description: String,
    /// Whether the parameter must be supplied.
    #[serde(default)]
    pub required: bool,
    /// Default value applied when the parameter is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ToolParameter {
    /// Convenience constructor for a required parameter.
    pub fn required(name: impl Into<String>, kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// Convenience constructor for an optional parameter.
    pub fn optional(name: impl Into<String>, kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            description: description.into(),
            required: false,
            default: None,
        }
    }
}

/// Serializable projection of a tool, handed to language models and listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name (registry key).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Ordered parameter schema.
    pub parameters: Vec<ToolParameter>,
}

/// The contract every tool implementation fulfils.
#[async_trait]
pub trait ToolCapability: Send + Sync {
    /// Unique tool name; the registry key.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Ordered parameter schema.
    fn parameters(&self) -> Vec<ToolParameter>;

    /// Execute the tool with the given arguments.
    ///
    /// # Errors
    ///
    /// Implementations return [`crate::Error::Execution`] (or a more specific
    /// variant) on failure; dispatch boundaries convert this into the uniform
    /// envelope or a wire error, never let it escape the inbound loop.
    async fn execute(&self, args: Map<String, Value>, auth: Option<&AuthContext>) -> Result<Value>;

    /// Check arguments against the declared schema without executing.
    fn validate(&self, args: &Map<String, Value>) -> bool;

    /// Release any held resources. Called once at server stop.
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    /// Serializable projection of this tool.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Metadata describing a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// The resource URI (registry key).
    pub uri: String,
    /// MIME content type of the fetched data.
    pub content_type: String,
    /// Size in bytes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// The contract every resource implementation fulfils.
#[async_trait]
pub trait ResourceCapability: Send + Sync {
    /// Unique resource URI; the registry key.
    fn uri(&self) -> &str;

    /// Resource metadata.
    fn metadata(&self) -> ResourceMetadata;

    /// Fetch the resource's data.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Execution`] when the underlying data cannot be
    /// produced.
    async fn fetch(&self, params: Option<Value>, auth: Option<&AuthContext>) -> Result<Value>;

    /// Whether the resource currently exists.
    async fn exists(&self) -> bool;
}

/// Uniform result envelope produced by dispatch.
///
/// Both successful and failed executions are wrapped; `duration_ms` is wall
/// clock time from call start to completion, measured on failure paths too.
/// Short-circuited failures (unknown tool, invalid arguments) report `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether execution succeeded.
    pub success: bool,
    /// The tool's result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure description on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock milliseconds from call start to completion.
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// A successful result.
    pub fn success(data: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            duration_ms,
        }
    }

    /// A failed result.
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn envelope_serializes_without_absent_fields() {
        let ok = ExecutionResult::success(Value::from(42), 7);
        let wire = serde_json::to_value(&ok).unwrap();
        assert_eq!(wire, serde_json::json!({"success": true, "data": 42, "duration_ms": 7}));

        let failed = ExecutionResult::failure("Invalid arguments for tool 'ws'", 0);
        let wire = serde_json::to_value(&failed).unwrap();
        assert_eq!(
            wire,
            serde_json::json!({
                "success": false,
                "error": "Invalid arguments for tool 'ws'",
                "duration_ms": 0
            })
        );
    }

    #[test]
    fn parameter_type_field_is_named_type_on_the_wire() {
        let param = ToolParameter::required("path", "string", "Workspace path");
        let wire = serde_json::to_value(&param).unwrap();
        assert_eq!(wire["type"], "string");
        assert_eq!(wire["required"], true);
    }
}
