//! Name-keyed component registry.
//!
//! Tools are keyed by name, resources by URI. Duplicate registration is a
//! programming error surfaced as [`Error::DuplicateRegistration`]; lookups for
//! absent keys return `None`, never an error.

use dashmap::DashMap;
use std::sync::Arc;

use crate::capability::{ResourceCapability, ToolCapability, ToolDescriptor};
use crate::error::{ComponentKind, Error, Result};

/// Registry of tools and resources available for dispatch.
///
/// Backed by concurrent maps so registration and lookup need no external
/// locking. Owned by the component that starts the server side and cleared on
/// stop.
#[derive(Default)]
pub struct Registry {
    tools: DashMap<String, Arc<dyn ToolCapability>>,
    resources: DashMap<String, Arc<dyn ResourceCapability>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("tools", &self.tools.len())
            .field("resources", &self.resources.len())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRegistration`] if a tool with the same name
    /// is already present.
    pub fn register_tool(&self, tool: Arc<dyn ToolCapability>) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(Error::DuplicateRegistration {
                kind: ComponentKind::Tool,
                name,
            });
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Register a resource under its URI.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRegistration`] if a resource with the same
    /// URI is already present.
    pub fn register_resource(&self, resource: Arc<dyn ResourceCapability>) -> Result<()> {
        let uri = resource.uri().to_string();
        if self.resources.contains_key(&uri) {
            return Err(Error::DuplicateRegistration {
                kind: ComponentKind::Resource,
                name: uri,
            });
        }
        self.resources.insert(uri, resource);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn tool(&self, name: &str) -> Option<Arc<dyn ToolCapability>> {
        self.tools.get(name).map(|entry| Arc::clone(&entry))
    }

    /// Look up a resource by URI.
    pub fn resource(&self, uri: &str) -> Option<Arc<dyn ResourceCapability>> {
        self.resources.get(uri).map(|entry| Arc::clone(&entry))
    }

    /// Snapshot of all registered tools.
    pub fn tools(&self) -> Vec<Arc<dyn ToolCapability>> {
        self.tools.iter().map(|entry| Arc::clone(&entry)).collect()
    }

    /// Snapshot of all registered resources.
    pub fn resources(&self) -> Vec<Arc<dyn ResourceCapability>> {
        self.resources.iter().map(|entry| Arc::clone(&entry)).collect()
    }

    /// Serializable descriptors for every registered tool.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|entry| entry.descriptor()).collect()
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.resources.is_empty()
    }

    /// Drop all entries. Used on server stop.
    pub fn clear(&self) {
        self.tools.clear();
        self.resources.clear();
    }
}
