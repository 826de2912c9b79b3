//! Tool system for agent capabilities.

use crate::{error::Result, types::ToolOutput};
use async_trait::async_trait;
use cheungfun_core::traits::ToolDescriptor;
use futures::{FutureExt, future::BoxFuture};
use serde::{Deserialize, Serialize};
use std::{fmt, future::Future, sync::Arc};

pub mod registry;

pub use registry::ToolRegistry;

/// Description of a tool as shown to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolMetadata {
    /// Unique tool name
    pub name: String,
    /// What the tool does
    pub description: String,
    /// JSON schema of the tool arguments
    pub parameters: serde_json::Value,
    /// Use the tool output as the final answer when the call succeeds
    #[serde(default)]
    pub return_direct: bool,
}

impl ToolMetadata {
    /// Create metadata with an empty object schema
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: object_schema(&[], &[]),
            return_direct: false,
        }
    }

    /// Set the argument schema
    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the return-direct flag
    #[must_use]
    pub fn with_return_direct(mut self, return_direct: bool) -> Self {
        self.return_direct = return_direct;
        self
    }

    /// Argument schema rendered as compact JSON
    #[must_use]
    pub fn parameters_json(&self) -> String {
        self.parameters.to_string()
    }

    /// Convert to the descriptor passed to function-calling models
    #[must_use]
    pub fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Core tool trait that all tools must implement.
///
/// Returning `Err` from [`Tool::call`] is not fatal to the agent: the error
/// text is fed back to the model as an error observation.
#[async_trait]
pub trait Tool: Send + Sync + fmt::Debug {
    /// Get the tool's metadata
    fn metadata(&self) -> ToolMetadata;

    /// Invoke the tool with a JSON object of arguments
    async fn call(&self, arguments: serde_json::Value) -> Result<ToolOutput>;

    /// Get the tool name
    fn name(&self) -> String {
        self.metadata().name
    }
}

type ToolFn = dyn Fn(serde_json::Value) -> BoxFuture<'static, Result<ToolOutput>> + Send + Sync;

/// A tool backed by a closure
#[derive(Clone)]
pub struct FunctionTool {
    metadata: ToolMetadata,
    func: Arc<ToolFn>,
}

impl FunctionTool {
    /// Create a tool from an async closure
    pub fn new<F, Fut>(metadata: ToolMetadata, func: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        Self {
            metadata,
            func: Arc::new(move |args: serde_json::Value| func(args).boxed()),
        }
    }

    /// Create a tool from a synchronous closure returning the output text
    pub fn from_fn<F>(metadata: ToolMetadata, func: F) -> Self
    where
        F: Fn(serde_json::Value) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            metadata,
            func: Arc::new(move |args: serde_json::Value| {
                let result = func(args).map(ToolOutput::success);
                async move { result }.boxed()
            }),
        }
    }
}

impl fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.metadata.name)
            .field("return_direct", &self.metadata.return_direct)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn metadata(&self) -> ToolMetadata {
        self.metadata.clone()
    }

    async fn call(&self, arguments: serde_json::Value) -> Result<ToolOutput> {
        (self.func)(arguments).await
    }
}

/// Build a JSON object schema from `(name, schema)` properties
#[must_use]
pub fn object_schema(properties: &[(&str, serde_json::Value)], required: &[&str]) -> serde_json::Value {
    let properties: serde_json::Map<String, serde_json::Value> = properties
        .iter()
        .map(|(name, schema)| ((*name).to_string(), schema.clone()))
        .collect();
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

/// Helper function to create a string parameter schema
#[must_use]
pub fn string_param(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}

/// Helper function to create a number parameter schema
#[must_use]
pub fn number_param(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "number",
        "description": description
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use serde_json::json;

    #[test]
    fn test_schema_helpers() {
        let schema = object_schema(&[("name", string_param("Who to greet"))], &["name"]);
        assert_eq!(schema["properties"]["name"]["type"], json!("string"));
        assert_eq!(schema["required"], json!(["name"]));

        let empty = ToolMetadata::new("noop", "Does nothing");
        assert_eq!(empty.parameters_json(), r#"{"properties":{},"required":[],"type":"object"}"#);
    }

    #[test]
    fn test_metadata_to_descriptor() {
        let metadata = ToolMetadata::new("add", "Add two numbers")
            .with_parameters(object_schema(
                &[("a", number_param("first")), ("b", number_param("second"))],
                &["a", "b"],
            ))
            .with_return_direct(true);
        let descriptor = metadata.to_descriptor();
        assert_eq!(descriptor.name, "add");
        assert_eq!(descriptor.parameters, metadata.parameters);
        assert!(metadata.return_direct);
    }

    #[tokio::test]
    async fn test_function_tool() {
        let upper = FunctionTool::from_fn(ToolMetadata::new("upper", "Uppercase text"), |args| {
            args["text"]
                .as_str()
                .map(str::to_uppercase)
                .ok_or_else(|| AgentError::validation("text", "missing"))
        });
        assert_eq!(upper.name(), "upper");
        assert_eq!(
            upper.call(json!({"text": "abc"})).await.unwrap(),
            ToolOutput::success("ABC")
        );
        assert!(upper.call(json!({})).await.is_err());

        let failing = FunctionTool::new(ToolMetadata::new("flaky", "Always fails"), |_args| async {
            Ok(ToolOutput::error("service unavailable"))
        });
        assert!(failing.call(json!({})).await.unwrap().is_error);
    }
}
