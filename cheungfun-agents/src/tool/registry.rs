//! Tool registry for managing and discovering tools.

use crate::{
    error::{AgentError, Result},
    tool::{Tool, ToolMetadata},
    types::ToolOutput,
};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info, warn};

/// Tool registry keyed by unique tool name.
///
/// Listing operations return tools in registration order, which is the order
/// they are described to the model.
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    /// Registered tools by name
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Registration order
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from tools, failing on duplicate names
    pub fn from_tools<I>(tools: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<dyn Tool>>,
    {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    /// Register a tool in the registry
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name();

        if name.trim().is_empty() {
            return Err(AgentError::validation("name", "Tool name cannot be empty"));
        }
        if self.tools.contains_key(&name) {
            return Err(AgentError::configuration(format!(
                "Tool '{name}' is already registered"
            )));
        }

        info!("Registering tool: {}", name);
        self.order.push(name.clone());
        self.tools.insert(name, tool);

        Ok(())
    }

    /// Get a tool by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(Arc::clone)
    }

    /// Check if a tool exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get all registered tool names in registration order
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Get the metadata of every tool in registration order
    #[must_use]
    pub fn metadata(&self) -> Vec<ToolMetadata> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.metadata())
            .collect()
    }

    /// Number of registered tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no tool is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Execute a tool by name
    pub async fn execute(&self, tool_name: &str, arguments: serde_json::Value) -> Result<ToolOutput> {
        let tool = self
            .get(tool_name)
            .ok_or_else(|| AgentError::tool(tool_name, "Tool not found in registry"))?;

        debug!("Executing tool '{}' with arguments: {}", tool_name, arguments);

        let result = tool.call(arguments).await;
        match &result {
            Ok(output) if output.is_error => {
                warn!("Tool '{}' reported an error: {}", tool_name, output.content);
            }
            Ok(_) => debug!("Tool '{}' executed successfully", tool_name),
            Err(e) => warn!("Tool '{}' execution error: {}", tool_name, e),
        }

        result
    }

    /// Remove a tool from the registry
    pub fn unregister(&mut self, tool_name: &str) -> Result<()> {
        if self.tools.remove(tool_name).is_none() {
            return Err(AgentError::configuration(format!(
                "Tool '{tool_name}' is not registered"
            )));
        }
        self.order.retain(|name| name != tool_name);

        info!("Tool '{}' unregistered", tool_name);
        Ok(())
    }

    /// Clear all tools from the registry
    pub fn clear(&mut self) {
        let count = self.tools.len();
        self.tools.clear();
        self.order.clear();
        info!("Cleared {} tools from registry", count);
    }
}
