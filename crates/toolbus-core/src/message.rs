//! Wire message model.
//!
//! One message per newline-delimited JSON object, shaped
//! `{"type": ..., "id": ..., "payload": ...}`. The `id` is caller-assigned and
//! correlates a `response`/`error` to the `request` that caused it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved tool name for liveness probes. Requests for it are answered inline
/// by the protocol engine and never dispatched through the registry.
pub const HEALTH_CHECK_TOOL: &str = "health_check";

/// Discriminant of a wire message.
///
/// Unknown values deserialize to [`MessageType::Unknown`] so that a peer
/// speaking a newer protocol revision does not break the inbound loop; the
/// loop ignores such messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// A correlated call: `payload` carries [`RequestPayload`].
    Request,
    /// The successful reply to a `Request` with the same id.
    Response,
    /// The failure reply to a `Request` with the same id; `payload` carries
    /// [`ErrorPayload`].
    Error,
    /// A one-way message with no reply expected.
    Notification,
    /// Any `type` value this revision does not know about.
    #[serde(other)]
    Unknown,
}

/// A single framed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The message discriminant, serialized as the `type` field.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Correlation id. Unique among in-flight requests from the same side.
    pub id: String,
    /// Free-form payload; its shape depends on `kind`.
    #[serde(default)]
    pub payload: Value,
}

/// Payload of a `request` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Name of the tool to invoke.
    pub tool: String,
    /// Named arguments for the tool.
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Payload of an `error` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Message {
    /// Build a `request` message for the named tool.
    pub fn request(id: impl Into<String>, tool: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            kind: MessageType::Request,
            id: id.into(),
            payload: serde_json::json!({ "tool": tool.into(), "args": args }),
        }
    }

    /// Build a `response` message carrying `payload` on the given id.
    pub fn response(id: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: MessageType::Response,
            id: id.into(),
            payload,
        }
    }

    /// Build an `error` message on the given id.
    pub fn error(id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Error,
            id: id.into(),
            payload: serde_json::json!({ "code": code.into(), "message": message.into() }),
        }
    }

    /// Build a `notification` message.
    pub fn notification(id: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: MessageType::Notification,
            id: id.into(),
            payload,
        }
    }

    /// Interpret this message's payload as a request payload.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the payload does not have the
    /// `{tool, args}` shape.
    pub fn request_payload(&self) -> crate::Result<RequestPayload> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Interpret this message's payload as an error payload.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the payload does not have the
    /// `{code, message}` shape.
    pub fn error_payload(&self) -> crate::Result<ErrorPayload> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_round_trips_with_exact_wire_shape() {
        let mut args = Map::new();
        args.insert("path".to_string(), Value::String("/tmp".to_string()));
        let msg = Message::request("t1", "workspace", args);

        let wire = serde_json::to_string(&msg).unwrap();
        let value: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(value["type"], "request");
        assert_eq!(value["id"], "t1");
        assert_eq!(value["payload"]["tool"], "workspace");
        assert_eq!(value["payload"]["args"]["path"], "/tmp");

        let back: Message = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, msg);
        let payload = back.request_payload().unwrap();
        assert_eq!(payload.tool, "workspace");
    }

    #[test]
    fn unknown_type_values_are_tolerated() {
        let msg: Message =
            serde_json::from_str(r#"{"type":"telemetry","id":"x","payload":{}}"#).unwrap();
        assert_eq!(msg.kind, MessageType::Unknown);
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let msg: Message = serde_json::from_str(r#"{"type":"notification","id":"n1"}"#).unwrap();
        assert_eq!(msg.payload, Value::Null);
    }

    #[test]
    fn error_payload_parses_code_and_message() {
        let msg = Message::error("t2", "EXECUTION_ERROR", "Tool not found: ghost");
        let payload = msg.error_payload().unwrap();
        assert_eq!(payload.code, "EXECUTION_ERROR");
        assert_eq!(payload.message, "Tool not found: ghost");
        assert_eq!(payload.details, None);
    }

    #[test]
    fn request_with_absent_args_parses_as_empty_map() {
        let msg: Message = serde_json::from_str(
            r#"{"type":"request","id":"h1","payload":{"tool":"health_check"}}"#,
        )
        .unwrap();
        let payload = msg.request_payload().unwrap();
        assert_eq!(payload.tool, HEALTH_CHECK_TOOL);
        assert!(payload.args.is_empty());
    }
}
