//! OpenAI-compatible chat-completions provider.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use toolbus_core::{Error, Result, ToolDescriptor};

use super::{LanguageModel, ModelReply};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for [`OpenAiProvider`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token budget.
    pub max_tokens: u32,
    /// API base URL; override for compatible backends.
    pub base_url: String,
}

impl OpenAiConfig {
    /// Configuration with the given key and default model settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Read the API key from `OPENAI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelBackend`] when the variable is unset.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            Error::ModelBackend("OPENAI_API_KEY is not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }
}

/// Chat-completions client exposing the [`LanguageModel`] capability.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    config: OpenAiConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ModelReply,
}

impl OpenAiProvider {
    /// Create a provider from an explicit configuration.
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Create a provider configured from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelBackend`] when `OPENAI_API_KEY` is unset.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(OpenAiConfig::from_env()?))
    }

    /// Project a tool descriptor into a chat-completions function definition.
    fn function_definition(tool: &ToolDescriptor) -> Value {
        let mut properties = serde_json::Map::new();
        for param in &tool.parameters {
            properties.insert(
                param.name.clone(),
                json!({ "type": param.kind, "description": param.description }),
            );
        }
        let required: Vec<&str> = tool
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                },
            },
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiProvider {
    async fn generate_tool_calls(
        &self,
        prompt: &str,
        tools: &[ToolDescriptor],
        system_prompt: Option<&str>,
    ) -> Result<ModelReply> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let definitions: Vec<Value> = tools.iter().map(Self::function_definition).collect();
        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "tools": definitions,
            "tool_choice": "auto",
        });

        debug!(model = %self.config.model, tools = tools.len(), "requesting completion");
        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ModelBackend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::ModelBackend(format!(
                "completion request failed with {status}: {detail}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::ModelBackend(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| Error::ModelBackend("response contained no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use toolbus_core::ToolParameter;

    #[test]
    fn function_definitions_carry_the_parameter_schema() {
        let tool = ToolDescriptor {
            name: "workspace".to_string(),
            description: "Workspace management operations".to_string(),
            parameters: vec![
                ToolParameter::required("operation", "string", "The operation to perform"),
                ToolParameter::optional("pattern", "string", "Search pattern for files"),
            ],
        };

        let def = OpenAiProvider::function_definition(&tool);
        assert_eq!(def["type"], "function");
        assert_eq!(def["function"]["name"], "workspace");
        assert_eq!(
            def["function"]["parameters"]["properties"]["operation"]["type"],
            "string"
        );
        assert_eq!(
            def["function"]["parameters"]["required"],
            json!(["operation"])
        );
    }

    #[test]
    fn tool_call_arguments_stay_json_encoded() {
        let reply: ModelReply = serde_json::from_str(
            r#"{
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "function": {"name": "workspace", "arguments": "{\"operation\":\"status\"}"}
                }]
            }"#,
        )
        .unwrap();

        let calls = reply.tool_calls.unwrap();
        assert_eq!(calls[0].function.name, "workspace");
        let args: Value = serde_json::from_str(&calls[0].function.arguments).unwrap();
        assert_eq!(args["operation"], "status");
    }
}
