//! # toolbus-server
//!
//! Server framework for the toolbus stack: the [`ServerCapability`] contract,
//! the registry-backed [`ToolServer`], and built-in tools.
//!
//! The server answers every dispatched call with the uniform
//! [`ExecutionResult`](toolbus_core::ExecutionResult) envelope; failures of a
//! single call never escape as errors. See [`server`] for the dispatch rules.
//!
//! ```no_run
//! use std::sync::Arc;
//! use toolbus_server::{ServerCapability, ServerConfig, ToolServer, tools::WorkspaceTool};
//!
//! # async fn run() -> toolbus_core::Result<()> {
//! let server = ToolServer::new(ServerConfig::new("demo"));
//! server.registry().register_tool(Arc::new(WorkspaceTool::new()))?;
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod server;
pub mod tools;

pub use config::ServerConfig;
pub use server::{ServerCapability, ServerState, ToolServer};
