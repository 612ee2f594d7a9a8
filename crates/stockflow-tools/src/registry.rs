//! Tool registry for resolving tool names

use crate::Tool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Name → tool map consulted by the executor
///
/// The registry is assembled once by the caller and then shared read-only
/// (typically behind an `Arc`) across every execution, so concurrent runs
/// for different subjects see the same tools.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new tool registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, returning the tool it replaced if the name was taken
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.name().to_string();
        let previous = self.tools.insert(name.clone(), tool);
        if previous.is_some() {
            debug!("Replaced tool registration: {}", name);
        }
        previous
    }

    /// Register a tool (builder style)
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool is registered
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// List all registered tools
    pub fn list_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl FromIterator<Arc<dyn Tool>> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Tool>>>(iter: I) -> Self {
        let mut registry = Self::new();
        for tool in iter {
            registry.register(tool);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FnTool;
    use serde_json::{Value, json};

    fn constant(name: &str, value: Value) -> FnTool {
        FnTool::new(name, move |_| {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    #[test]
    fn test_register_and_get() {
        let registry = ToolRegistry::new()
            .with_tool(constant("get_industry_data", json!({"industry": "autos"})))
            .with_tool(constant("get_market_data", json!({"price": 1.0})));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("get_industry_data"));
        assert!(registry.get("get_market_data").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["get_industry_data", "get_market_data"]);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register(Arc::new(constant("a", json!(1)))).is_none());
        assert!(registry.register(Arc::new(constant("a", json!(2)))).is_some());
        assert_eq!(registry.len(), 1);

        let out = tokio_test::block_on(registry.get("a").unwrap().execute(json!({})));
        assert_eq!(out.unwrap(), json!(2));
    }

    #[test]
    fn test_from_iterator() {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(constant("x", json!(null))),
            Arc::new(constant("y", json!(null))),
        ];
        let registry: ToolRegistry = tools.into_iter().collect();
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
        assert_eq!(registry.list_tools().len(), 2);
    }
}
