//! The server framework: capability contract and the concrete [`ToolServer`].
//!
//! Dispatch through the server never returns `Err` for per-call failures; every
//! call is answered with the uniform [`ExecutionResult`] envelope so that a
//! misbehaving tool cannot take the serving loop down with it. Lifecycle
//! methods (`start`/`stop`) do return errors, since calling them in the wrong
//! state is a programming mistake rather than a runtime condition.

use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use toolbus_core::{AuthContext, Error, ExecutionResult, Registry, Result};

use crate::ServerConfig;

/// Snapshot of a server's runtime state.
#[derive(Debug, Clone)]
pub struct ServerState {
    /// Whether the server is between `start` and `stop`.
    pub running: bool,
    /// Number of active connections.
    pub connections: usize,
    /// When this server instance was created.
    pub started_at: SystemTime,
    /// Dispatch failures accumulated since creation.
    pub errors: Vec<String>,
}

/// The contract a server implementation fulfils.
#[async_trait]
pub trait ServerCapability: Send + Sync {
    /// One-time setup before `start`; registers built-in capabilities.
    async fn initialize(&self) -> Result<()>;

    /// Begin serving.
    ///
    /// # Errors
    ///
    /// Fails if the server is already running.
    async fn start(&self) -> Result<()>;

    /// Stop serving and release tool resources.
    ///
    /// # Errors
    ///
    /// Fails if the server is not running.
    async fn stop(&self) -> Result<()>;

    /// Dispatch a named tool call, always answering with the envelope.
    async fn handle_tool_call(
        &self,
        name: &str,
        args: Map<String, Value>,
        auth: Option<&AuthContext>,
    ) -> ExecutionResult;

    /// Dispatch a resource fetch, always answering with the envelope.
    async fn handle_resource_request(
        &self,
        uri: &str,
        params: Option<Value>,
        auth: Option<&AuthContext>,
    ) -> ExecutionResult;

    /// Snapshot of the current server state.
    fn state(&self) -> ServerState;
}

struct StateInner {
    running: bool,
    connections: usize,
    errors: Vec<String>,
}

/// A registry-backed server.
///
/// Cheap to share behind an [`Arc`]; the registry can also be shared with a
/// protocol engine so that inbound wire requests and local dispatch see the
/// same tool set.
pub struct ToolServer {
    config: ServerConfig,
    registry: Arc<Registry>,
    state: Mutex<StateInner>,
    started_at: SystemTime,
}

impl std::fmt::Debug for ToolServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolServer")
            .field("config", &self.config)
            .field("tools", &self.registry.tool_count())
            .finish_non_exhaustive()
    }
}

impl ToolServer {
    /// Create a server with its own empty registry.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, Arc::new(Registry::new()))
    }

    /// Create a server over an existing registry.
    pub fn with_registry(config: ServerConfig, registry: Arc<Registry>) -> Self {
        Self {
            config,
            registry,
            state: Mutex::new(StateInner {
                running: false,
                connections: 0,
                errors: Vec::new(),
            }),
            started_at: SystemTime::now(),
        }
    }

    /// The registry backing this server.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn record_error(&self, message: String) {
        self.state
            .lock()
            .expect("server state lock poisoned")
            .errors
            .push(message);
    }
}

#[async_trait]
impl ServerCapability for ToolServer {
    async fn initialize(&self) -> Result<()> {
        debug!(server = %self.config.name, "server initialized");
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().expect("server state lock poisoned");
        if state.running {
            return Err(Error::Execution(format!(
                "Server '{}' is already running",
                self.config.name
            )));
        }
        state.running = true;
        drop(state);
        info!(
            server = %self.config.name,
            version = %self.config.version,
            tools = self.registry.tool_count(),
            "server started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock().expect("server state lock poisoned");
            if !state.running {
                return Err(Error::Execution(format!(
                    "Server '{}' is not running",
                    self.config.name
                )));
            }
            state.running = false;
        }

        // Run every tool's cleanup concurrently and wait for all of them to
        // settle; a failing cleanup is logged but never blocks the others or
        // the shutdown itself.
        let tools = self.registry.tools();
        let results = join_all(tools.iter().map(|tool| tool.cleanup())).await;
        for (tool, result) in tools.iter().zip(results) {
            if let Err(e) = result {
                warn!(tool = tool.name(), error = %e, "tool cleanup failed");
            }
        }
        self.registry.clear();
        info!(server = %self.config.name, "server stopped");
        Ok(())
    }

    async fn handle_tool_call(
        &self,
        name: &str,
        args: Map<String, Value>,
        auth: Option<&AuthContext>,
    ) -> ExecutionResult {
        let Some(tool) = self.registry.tool(name) else {
            return ExecutionResult::failure(format!("Tool '{name}' not found"), 0);
        };
        if !tool.validate(&args) {
            return ExecutionResult::failure(format!("Invalid arguments for tool '{name}'"), 0);
        }

        let started = Instant::now();
        match tool.execute(args, auth).await {
            Ok(data) => {
                let elapsed = started.elapsed().as_millis() as u64;
                debug!(tool = name, duration_ms = elapsed, "tool call succeeded");
                ExecutionResult::success(data, elapsed)
            }
            Err(e) => {
                let elapsed = started.elapsed().as_millis() as u64;
                warn!(tool = name, error = %e, "tool call failed");
                self.record_error(format!("{name}: {e}"));
                ExecutionResult::failure(e.to_string(), elapsed)
            }
        }
    }

    async fn handle_resource_request(
        &self,
        uri: &str,
        params: Option<Value>,
        auth: Option<&AuthContext>,
    ) -> ExecutionResult {
        let Some(resource) = self.registry.resource(uri) else {
            return ExecutionResult::failure(format!("Resource '{uri}' not found"), 0);
        };

        let started = Instant::now();
        match resource.fetch(params, auth).await {
            Ok(data) => {
                let elapsed = started.elapsed().as_millis() as u64;
                ExecutionResult::success(data, elapsed)
            }
            Err(e) => {
                let elapsed = started.elapsed().as_millis() as u64;
                warn!(resource = uri, error = %e, "resource fetch failed");
                self.record_error(format!("{uri}: {e}"));
                ExecutionResult::failure(e.to_string(), elapsed)
            }
        }
    }

    fn state(&self) -> ServerState {
        let state = self.state.lock().expect("server state lock poisoned");
        ServerState {
            running: state.running,
            connections: state.connections,
            started_at: self.started_at,
            errors: state.errors.clone(),
        }
    }
}
