//! Workspace management tool.

use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::fs;

use toolbus_core::{AuthContext, Error, Result, ToolCapability, ToolParameter};

const OPERATIONS: [&str; 4] = ["init", "status", "search", "clean"];

/// Filesystem operations over a workspace directory: `init` creates it,
/// `status` stats it, `search` finds files by name substring, `clean` removes
/// its children.
#[derive(Debug, Default)]
pub struct WorkspaceTool;

impl WorkspaceTool {
    /// Create the tool.
    pub fn new() -> Self {
        Self
    }

    /// Recursive filename search, iterative to keep the future `Send` without
    /// boxing.
    async fn search_files(root: &str, pattern: &str) -> Result<Vec<String>> {
        let mut results = Vec::new();
        let mut pending = vec![PathBuf::from(root)];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| Error::Execution(format!("Failed to read {}: {e}", dir.display())))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::Execution(e.to_string()))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| Error::Execution(e.to_string()))?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if entry.file_name().to_string_lossy().contains(pattern) {
                    results.push(entry.path().display().to_string());
                }
            }
        }
        results.sort();
        Ok(results)
    }
}

fn string_arg<'a>(args: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

#[async_trait]
impl ToolCapability for WorkspaceTool {
    fn name(&self) -> &str {
        "workspace"
    }

    fn description(&self) -> &str {
        "Workspace management operations"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("operation", "string", "The operation to perform"),
            ToolParameter::required("path", "string", "Workspace path"),
            ToolParameter::optional("pattern", "string", "Search pattern for files"),
        ]
    }

    async fn execute(
        &self,
        args: Map<String, Value>,
        _auth: Option<&AuthContext>,
    ) -> Result<Value> {
        let operation = string_arg(&args, "operation")
            .ok_or_else(|| Error::InvalidArguments("workspace".to_string()))?;
        let path = string_arg(&args, "path")
            .ok_or_else(|| Error::InvalidArguments("workspace".to_string()))?;

        match operation {
            "init" => {
                fs::create_dir_all(path)
                    .await
                    .map_err(|e| Error::Execution(format!("Failed to initialize {path}: {e}")))?;
                Ok(json!({ "message": format!("Workspace initialized at {path}") }))
            }
            "status" => {
                let metadata = fs::metadata(path)
                    .await
                    .map_err(|e| Error::Execution(format!("Failed to stat {path}: {e}")))?;
                let modified = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as u64);
                Ok(json!({
                    "exists": true,
                    "is_directory": metadata.is_dir(),
                    "size": metadata.len(),
                    "modified": modified,
                }))
            }
            "search" => {
                let pattern = string_arg(&args, "pattern")
                    .ok_or_else(|| Error::Execution("Search pattern is required".to_string()))?;
                let files = Self::search_files(path, pattern).await?;
                Ok(json!({ "files": files }))
            }
            "clean" => {
                let mut entries = fs::read_dir(path)
                    .await
                    .map_err(|e| Error::Execution(format!("Failed to read {path}: {e}")))?;
                let mut removed = 0usize;
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| Error::Execution(e.to_string()))?
                {
                    let target = entry.path();
                    let is_dir = entry
                        .file_type()
                        .await
                        .map_err(|e| Error::Execution(e.to_string()))?
                        .is_dir();
                    let result = if is_dir {
                        fs::remove_dir_all(&target).await
                    } else {
                        fs::remove_file(&target).await
                    };
                    result.map_err(|e| {
                        Error::Execution(format!("Failed to remove {}: {e}", target.display()))
                    })?;
                    removed += 1;
                }
                Ok(json!({ "message": format!("Workspace cleaned: {removed} items removed") }))
            }
            other => Err(Error::Execution(format!("Unknown operation: {other}"))),
        }
    }

    fn validate(&self, args: &Map<String, Value>) -> bool {
        let operation_ok = string_arg(args, "operation")
            .is_some_and(|op| OPERATIONS.contains(&op));
        let path_ok = string_arg(args, "path").is_some();
        let pattern_ok = match args.get("pattern") {
            None => true,
            Some(value) => value.is_string(),
        };
        operation_ok && path_ok && pattern_ok
    }
}
