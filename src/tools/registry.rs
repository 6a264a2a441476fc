//! Tool registry for Relaybot
//!
//! This module provides the `ToolRegistry` struct holding the tool bindings
//! active for a run. The caller assembles the registry; the runtime only
//! looks tools up by name.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::providers::ToolDefinition;

use super::{Tool, ToolBinding};

/// A registry that holds tool bindings keyed by name.
///
/// # Example
///
/// ```rust
/// use relaybot::error::ToolError;
/// use relaybot::tools::{FnTool, ToolRegistry, ToolResult};
/// use serde_json::json;
///
/// let mut registry = ToolRegistry::new();
/// registry.register(FnTool::new(
///     "echo",
///     "Echo the arguments back",
///     json!({"type": "object"}),
///     |args, _ctx| async move { Ok::<_, ToolError>(ToolResult::new(json!(args))) },
/// ));
///
/// assert!(registry.has("echo"));
/// assert_eq!(registry.definitions().len(), 1);
/// ```
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolBinding>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    ///
    /// # Example
    /// ```
    /// use relaybot::tools::ToolRegistry;
    ///
    /// let registry = ToolRegistry::new();
    /// assert_eq!(registry.names().len(), 0);
    /// ```
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool in the registry.
    ///
    /// If a tool with the same name already exists, it will be replaced.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_binding(ToolBinding::new(tool));
    }

    /// Register an already shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.register_binding(ToolBinding::from_arc(tool));
    }

    /// Register a prepared binding.
    pub fn register_binding(&mut self, binding: ToolBinding) {
        let name = binding.name().to_string();
        info!(tool = %name, "Registering tool");
        self.tools.insert(name, binding);
    }

    /// Get a binding by name.
    pub fn get(&self, name: &str) -> Option<&ToolBinding> {
        self.tools.get(name)
    }

    /// Get all tool definitions, sorted by name.
    ///
    /// A stable order keeps provider prompt caches warm across requests.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|b| b.definition.clone())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Get the names of all registered tools, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check if a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl FromIterator<ToolBinding> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = ToolBinding>>(iter: I) -> Self {
        let mut registry = ToolRegistry::new();
        for binding in iter {
            registry.register_binding(binding);
        }
        registry
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tools::{FnTool, ToolResult};
    use serde_json::json;

    fn tool(name: &str, description: &str) -> FnTool {
        FnTool::new(
            name,
            description,
            json!({"type": "object", "properties": {}}),
            |_args, _ctx| async { Ok::<_, ToolError>(ToolResult::text("ok")) },
        )
    }

    #[test]
    fn test_registry_new() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_registry_default() {
        let registry = ToolRegistry::default();
        assert!(registry.names().is_empty());
    }

    #[test]
    fn test_registry_register() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("calculator", "Do math"));

        assert!(registry.has("calculator"));
        assert!(!registry.has("nonexistent"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_get() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("calculator", "Do math"));

        let binding = registry.get("calculator").unwrap();
        assert_eq!(binding.tool.name(), "calculator");
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_registry_definitions_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("web_fetch", "Fetch"));
        registry.register(tool("calculator", "Math"));
        registry.register(tool("memory", "Remember"));

        let names: Vec<String> = registry
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["calculator", "memory", "web_fetch"]);
        assert_eq!(registry.names(), vec!["calculator", "memory", "web_fetch"]);
    }

    #[test]
    fn test_registry_replace_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("calculator", "old"));
        registry.register(tool("calculator", "new"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.definitions()[0].description, "new");
    }

    #[test]
    fn test_registry_from_iter() {
        let registry: ToolRegistry = vec![
            ToolBinding::new(tool("a", "A")),
            ToolBinding::new(tool("b", "B")),
        ]
        .into_iter()
        .collect();
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert!(format!("{:?}", registry).contains("\"a\""));
    }
}
