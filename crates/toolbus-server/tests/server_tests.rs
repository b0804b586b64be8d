//! Integration tests for the server framework: lifecycle, validated dispatch,
//! and shutdown cleanup.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};

use toolbus_core::{
    AuthContext, Error, ResourceCapability, ResourceMetadata, Result, ToolCapability,
    ToolParameter,
};
use toolbus_server::{ServerCapability, ServerConfig, ToolServer};

/// Tool with scriptable validation/execution behavior and call counters.
struct ProbeTool {
    name: &'static str,
    accept_args: bool,
    fail_execute: bool,
    fail_cleanup: bool,
    execute_delay: Duration,
    executions: AtomicU32,
    cleanups: AtomicU32,
}

impl ProbeTool {
    fn named(name: &'static str) -> Self {
        Self {
            name,
            accept_args: true,
            fail_execute: false,
            fail_cleanup: false,
            execute_delay: Duration::ZERO,
            executions: AtomicU32::new(0),
            cleanups: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ToolCapability for ProbeTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "probe"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::optional("value", "string", "Any value")]
    }

    async fn execute(&self, _args: Map<String, Value>, _auth: Option<&AuthContext>) -> Result<Value> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if !self.execute_delay.is_zero() {
            tokio::time::sleep(self.execute_delay).await;
        }
        if self.fail_execute {
            Err(Error::Execution("probe exploded".to_string()))
        } else {
            Ok(json!({ "ok": true }))
        }
    }

    fn validate(&self, _args: &Map<String, Value>) -> bool {
        self.accept_args
    }

    async fn cleanup(&self) -> Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        if self.fail_cleanup {
            Err(Error::Execution("cleanup exploded".to_string()))
        } else {
            Ok(())
        }
    }
}

struct StaticResource {
    exists: AtomicBool,
}

#[async_trait]
impl ResourceCapability for StaticResource {
    fn uri(&self) -> &str {
        "memory://greeting"
    }

    fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata {
            uri: "memory://greeting".to_string(),
            content_type: "text/plain".to_string(),
            size: Some(5),
        }
    }

    async fn fetch(&self, _params: Option<Value>, _auth: Option<&AuthContext>) -> Result<Value> {
        Ok(Value::String("hello".to_string()))
    }

    async fn exists(&self) -> bool {
        self.exists.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn start_twice_and_stop_when_idle_both_fail() {
    let server = ToolServer::new(ServerConfig::new("lifecycle"));
    assert!(server.stop().await.is_err());

    server.start().await.unwrap();
    assert!(server.state().running);
    assert!(server.start().await.is_err());

    server.stop().await.unwrap();
    assert!(!server.state().running);
    assert!(server.stop().await.is_err());
}

#[tokio::test]
async fn unknown_tool_short_circuits_with_zero_duration() {
    let server = ToolServer::new(ServerConfig::default());
    let result = server.handle_tool_call("ghost", Map::new(), None).await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Tool 'ghost' not found"));
    assert_eq!(result.duration_ms, 0);
    assert_eq!(result.data, None);
}

#[tokio::test]
async fn failed_validation_never_reaches_execute() {
    let server = ToolServer::new(ServerConfig::default());
    let tool = Arc::new(ProbeTool {
        accept_args: false,
        ..ProbeTool::named("picky")
    });
    server.registry().register_tool(tool.clone()).unwrap();

    let result = server.handle_tool_call("picky", Map::new(), None).await;

    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("Invalid arguments for tool 'picky'")
    );
    assert_eq!(result.duration_ms, 0);
    assert_eq!(tool.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn execution_duration_is_measured_on_success_and_failure() {
    let server = ToolServer::new(ServerConfig::default());
    server
        .registry()
        .register_tool(Arc::new(ProbeTool {
            execute_delay: Duration::from_millis(25),
            ..ProbeTool::named("slow")
        }))
        .unwrap();
    server
        .registry()
        .register_tool(Arc::new(ProbeTool {
            fail_execute: true,
            execute_delay: Duration::from_millis(25),
            ..ProbeTool::named("slow-fail")
        }))
        .unwrap();

    let ok = server.handle_tool_call("slow", Map::new(), None).await;
    assert!(ok.success);
    assert_eq!(ok.data, Some(json!({ "ok": true })));
    assert!(ok.duration_ms >= 25);

    let failed = server.handle_tool_call("slow-fail", Map::new(), None).await;
    assert!(!failed.success);
    assert_eq!(
        failed.error.as_deref(),
        Some("Execution failed: probe exploded")
    );
    assert!(failed.duration_ms >= 25);
}

#[tokio::test]
async fn dispatch_failures_accumulate_in_server_state() {
    let server = ToolServer::new(ServerConfig::default());
    server
        .registry()
        .register_tool(Arc::new(ProbeTool {
            fail_execute: true,
            ..ProbeTool::named("broken")
        }))
        .unwrap();

    server.handle_tool_call("broken", Map::new(), None).await;
    server.handle_tool_call("broken", Map::new(), None).await;

    let state = server.state();
    assert_eq!(state.errors.len(), 2);
    assert!(state.errors[0].contains("broken"));
}

#[tokio::test]
async fn stop_runs_every_cleanup_once_and_clears_the_registry() {
    let server = ToolServer::new(ServerConfig::default());
    let healthy = Arc::new(ProbeTool::named("healthy"));
    let broken = Arc::new(ProbeTool {
        fail_cleanup: true,
        ..ProbeTool::named("broken")
    });
    server.registry().register_tool(healthy.clone()).unwrap();
    server.registry().register_tool(broken.clone()).unwrap();

    server.start().await.unwrap();
    server.stop().await.unwrap();

    // Both cleanups ran exactly once despite one failing, and the registry is
    // empty afterwards.
    assert_eq!(healthy.cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(broken.cleanups.load(Ordering::SeqCst), 1);
    assert!(server.registry().is_empty());
    assert!(!server.state().running);
}

#[tokio::test]
async fn resource_requests_use_the_same_envelope() {
    let server = ToolServer::new(ServerConfig::default());
    server
        .registry()
        .register_resource(Arc::new(StaticResource {
            exists: AtomicBool::new(true),
        }))
        .unwrap();

    let hit = server
        .handle_resource_request("memory://greeting", None, None)
        .await;
    assert!(hit.success);
    assert_eq!(hit.data, Some(Value::String("hello".to_string())));

    let miss = server
        .handle_resource_request("memory://absent", None, None)
        .await;
    assert!(!miss.success);
    assert_eq!(
        miss.error.as_deref(),
        Some("Resource 'memory://absent' not found")
    );
    assert_eq!(miss.duration_ms, 0);
}
