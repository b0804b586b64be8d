//! Language-model capability.
//!
//! The client consumes language models only through the [`LanguageModel`]
//! trait; [`OpenAiProvider`] is the built-in chat-completions implementation.

mod openai;

pub use openai::{OpenAiConfig, OpenAiProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use toolbus_core::{Result, ToolDescriptor};

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned call id, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The function to call.
    pub function: FunctionCall,
}

/// The function part of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Tool name.
    pub name: String,
    /// JSON-encoded arguments object; parsed before dispatch.
    pub arguments: String,
}

/// A model's answer to a prompt: plain content, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelReply {
    /// Plain-text reply, if any.
    #[serde(default)]
    pub content: Option<String>,
    /// Tool calls the model wants executed, if any.
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

/// A language model that can answer prompts and request tool invocations.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Ask the model to answer `prompt`, offering `tools` for it to call.
    ///
    /// # Errors
    ///
    /// Returns [`toolbus_core::Error::ModelBackend`] when the backend cannot
    /// be reached or returns an unusable response. Such failures are never
    /// retried by the client.
    async fn generate_tool_calls(
        &self,
        prompt: &str,
        tools: &[ToolDescriptor],
        system_prompt: Option<&str>,
    ) -> Result<ModelReply>;
}
