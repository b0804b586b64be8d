//! # toolbus-client
//!
//! Client orchestrator for the toolbus stack. A [`Client`] ties together a
//! protocol engine, a [`LanguageModel`](llm::LanguageModel), a conversation
//! history, and TTL caches for resources and prompt templates, and wraps the
//! engine's wire calls in its own bounded retry policy.
//!
//! ```no_run
//! use std::sync::Arc;
//! use toolbus_client::{Client, ClientConfig, llm::OpenAiProvider};
//! use toolbus_transport::StdioTransport;
//!
//! # async fn run() -> toolbus_core::Result<()> {
//! let model = Arc::new(OpenAiProvider::from_env()?);
//! let client = Client::new(ClientConfig::new("demo"), model);
//! client.connect(Arc::new(StdioTransport::new())).await?;
//! client.send_message("Initialize a workspace at /tmp/demo").await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod llm;

pub use client::{ChatMessage, Client, PromptDescriptor, ResourceDescriptor, Role};
pub use config::ClientConfig;
