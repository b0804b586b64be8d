//! The client orchestrator.
//!
//! A [`Client`] owns a protocol engine, a conversation history, and TTL caches
//! for resources and prompt templates. It layers its own bounded retry policy
//! on top of the engine for connecting and for tool calls; the two policies
//! count attempts independently. Language-model failures are never retried.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use toolbus_core::{Error, Registry, Result};
use toolbus_engine::{EngineConfig, ProtocolEngine};
use toolbus_transport::Transport;

use crate::cache::CacheEntry;
use crate::config::ClientConfig;
use crate::llm::LanguageModel;

/// System prompt sent with every model request.
const SYSTEM_PROMPT: &str = "You are a helpful assistant that can use tools to help users.\n\
Your responses should be clear and concise.\n\
When using tools, explain what you're doing and why.\n\
If you encounter any errors, explain them clearly to the user.";

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human user.
    User,
    /// The assistant (model output or serialized tool results).
    Assistant,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Turn author.
    pub role: Role,
    /// Turn text.
    pub content: String,
}

/// A resource as listed by the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource URI.
    pub uri: String,
    /// MIME content type, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Human-readable description, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A prompt template as listed by the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDescriptor {
    /// Prompt name.
    pub name: String,
    /// Human-readable description, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Template body, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// High-level client over a protocol engine and a language model.
pub struct Client {
    config: ClientConfig,
    engine: ProtocolEngine,
    model: Arc<dyn LanguageModel>,
    messages: Mutex<Vec<ChatMessage>>,
    resources: Mutex<HashMap<String, CacheEntry<Value>>>,
    prompts: Mutex<HashMap<String, CacheEntry<PromptDescriptor>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client with a fresh engine and empty registry.
    pub fn new(config: ClientConfig, model: Arc<dyn LanguageModel>) -> Self {
        let engine = ProtocolEngine::new(Arc::new(Registry::new()));
        Self::with_engine(config, model, engine)
    }

    /// Create a client with a custom engine configuration.
    pub fn with_engine_config(
        config: ClientConfig,
        model: Arc<dyn LanguageModel>,
        engine_config: EngineConfig,
    ) -> Self {
        let engine = ProtocolEngine::with_config(Arc::new(Registry::new()), engine_config);
        Self::with_engine(config, model, engine)
    }

    /// Create a client over an existing engine.
    pub fn with_engine(
        config: ClientConfig,
        model: Arc<dyn LanguageModel>,
        engine: ProtocolEngine,
    ) -> Self {
        Self {
            config,
            engine,
            model,
            messages: Mutex::new(Vec::new()),
            resources: Mutex::new(HashMap::new()),
            prompts: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying protocol engine.
    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    /// Attach a transport, retrying failed attempts with linear backoff.
    ///
    /// A failed attempt is fully torn down before the next one so each retry
    /// starts from a clean engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] naming the attempt count once the retry
    /// budget is exhausted.
    pub async fn connect(&self, transport: Arc<dyn Transport>) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            match self.engine.connect(Arc::clone(&transport)).await {
                Ok(()) => return Ok(()),
                Err(e) if attempts < self.config.max_retries => {
                    attempts += 1;
                    warn!(
                        attempt = attempts,
                        max = self.config.max_retries,
                        error = %e,
                        "connection attempt failed, retrying"
                    );
                    if let Err(teardown) = self.engine.disconnect().await {
                        debug!(error = %teardown, "teardown before retry failed");
                    }
                    tokio::time::sleep(self.config.retry_base_delay * attempts).await;
                }
                Err(e) => {
                    return Err(Error::Connection(format!(
                        "Failed to connect after {} attempts: {e}",
                        self.config.max_retries
                    )));
                }
            }
        }
    }

    /// Detach from the peer.
    ///
    /// # Errors
    ///
    /// Propagates engine teardown failures.
    pub async fn disconnect(&self) -> Result<()> {
        self.engine.disconnect().await
    }

    /// Execute a tool on the peer, retrying failures with linear backoff.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] naming the tool and attempt count once the
    /// retry budget is exhausted.
    pub async fn execute_tool_call(&self, tool: &str, args: Map<String, Value>) -> Result<Value> {
        let mut attempts = 0u32;
        loop {
            match self.engine.request(tool, args.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if attempts < self.config.max_retries => {
                    attempts += 1;
                    warn!(
                        tool,
                        attempt = attempts,
                        max = self.config.max_retries,
                        error = %e,
                        "tool call failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_base_delay * attempts).await;
                }
                Err(e) => {
                    return Err(Error::Execution(format!(
                        "Failed to execute tool {tool} after {} attempts: {e}",
                        self.config.max_retries
                    )));
                }
            }
        }
    }

    /// Process one user message: ask the model, execute any tool calls it
    /// requests, and record the outcome in the conversation history.
    ///
    /// # Errors
    ///
    /// Any unrecovered failure is appended to the history as an apologetic
    /// assistant turn and then re-raised.
    pub async fn send_message(&self, content: &str) -> Result<()> {
        self.push_message(Role::User, content.to_string());
        match self.drive_model_turn(content).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(error = %e, "message processing failed");
                self.push_message(
                    Role::Assistant,
                    format!("I apologize, but I encountered an error: {e}"),
                );
                Err(e)
            }
        }
    }

    async fn drive_model_turn(&self, content: &str) -> Result<()> {
        let tools = self.engine.list_tools();
        let reply = self
            .model
            .generate_tool_calls(content, &tools, Some(SYSTEM_PROMPT))
            .await?;

        match reply.tool_calls {
            Some(calls) if !calls.is_empty() => {
                for call in calls {
                    let args: Map<String, Value> = serde_json::from_str(&call.function.arguments)?;
                    let result = self.execute_tool_call(&call.function.name, args).await?;
                    self.push_message(Role::Assistant, serde_json::to_string(&result)?);
                }
            }
            _ => self.push_message(Role::Assistant, reply.content.unwrap_or_default()),
        }
        Ok(())
    }

    /// Fetch a resource, answering from the cache while the entry is fresh.
    ///
    /// # Errors
    ///
    /// Propagates wire failures on a cache miss.
    pub async fn fetch_resource(&self, uri: &str) -> Result<Value> {
        {
            let cache = self.resources.lock().expect("resource cache lock poisoned");
            if let Some(entry) = cache.get(uri) {
                if entry.is_fresh(self.config.cache_ttl) {
                    debug!(uri, "resource served from cache");
                    return Ok(entry.value.clone());
                }
            }
        }

        let mut args = Map::new();
        args.insert("uri".to_string(), Value::String(uri.to_string()));
        let value = self.engine.request("fetch_resource", args).await?;
        self.resources
            .lock()
            .expect("resource cache lock poisoned")
            .insert(uri.to_string(), CacheEntry::new(value.clone()));
        Ok(value)
    }

    /// List the peer's resources. Always goes to the wire; refreshes the cache
    /// timestamp of every returned entry that is already cached.
    ///
    /// # Errors
    ///
    /// Propagates wire failures and malformed listings.
    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>> {
        let value = self.engine.request("list_resources", Map::new()).await?;
        let entries: Vec<ResourceDescriptor> = serde_json::from_value(value)?;

        let mut cache = self.resources.lock().expect("resource cache lock poisoned");
        for entry in &entries {
            if let Some(cached) = cache.get_mut(&entry.uri) {
                cached.refresh();
            }
        }
        Ok(entries)
    }

    /// List the peer's prompt templates. Always goes to the wire; every
    /// returned template is cached with a fresh timestamp.
    ///
    /// # Errors
    ///
    /// Propagates wire failures and malformed listings.
    pub async fn list_prompts(&self) -> Result<Vec<PromptDescriptor>> {
        let value = self.engine.request("list_prompts", Map::new()).await?;
        let entries: Vec<PromptDescriptor> = serde_json::from_value(value)?;

        let mut cache = self.prompts.lock().expect("prompt cache lock poisoned");
        for entry in &entries {
            cache.insert(entry.name.clone(), CacheEntry::new(entry.clone()));
        }
        Ok(entries)
    }

    /// Execute a named prompt template on the peer.
    ///
    /// The template is resolved through the cache, re-listing when the entry
    /// is stale or missing.
    ///
    /// # Errors
    ///
    /// Fails when the prompt does not exist after a refresh, the wire call
    /// fails, or the result is not a string.
    pub async fn execute_prompt(&self, name: &str, args: Map<String, Value>) -> Result<String> {
        let cached_fresh = self
            .prompts
            .lock()
            .expect("prompt cache lock poisoned")
            .get(name)
            .is_some_and(|entry| entry.is_fresh(self.config.cache_ttl));
        if !cached_fresh {
            let listed = self.list_prompts().await?;
            if !listed.iter().any(|p| p.name == name) {
                return Err(Error::Execution(format!("Prompt not found: {name}")));
            }
        }

        let mut call_args = Map::new();
        call_args.insert("name".to_string(), Value::String(name.to_string()));
        call_args.insert("args".to_string(), Value::Object(args));
        let value = self.engine.request("execute_prompt", call_args).await?;
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| Error::Serialization("prompt result was not a string".to_string()))
    }

    /// Snapshot of the conversation history.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages
            .lock()
            .expect("message history lock poisoned")
            .clone()
    }

    fn push_message(&self, role: Role, content: String) {
        self.messages
            .lock()
            .expect("message history lock poisoned")
            .push(ChatMessage { role, content });
    }
}
