//! Core types shared by agents and tools.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Output produced by a tool invocation.
///
/// Tool failures are values, not errors: the agent feeds them back to the
/// model as observations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolOutput {
    /// Output content shown to the model
    pub content: String,
    /// Whether the execution was an error
    pub is_error: bool,
}

impl ToolOutput {
    /// Create a successful output
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Create an error output
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Record of one tool call made during a turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallResult {
    /// Name the model asked for
    pub tool_name: String,
    /// Call identifier, from the model when it provides one
    pub call_id: String,
    /// Arguments passed to the tool
    pub arguments: serde_json::Value,
    /// Tool output
    pub output: ToolOutput,
    /// Whether the tool asks for its output to be returned as the answer
    pub return_direct: bool,
}

impl ToolCallResult {
    /// Whether this call ends the turn with the tool output as answer
    #[must_use]
    pub fn ends_turn(&self) -> bool {
        self.return_direct && !self.output.is_error
    }
}

/// Result of one agent turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Final answer, possibly empty when the iteration limit was reached
    pub response: String,
    /// Tool calls made during the turn, in order
    pub tool_calls: Vec<ToolCallResult>,
    /// Tool outputs the answer was derived from
    pub sources: Vec<ToolOutput>,
    /// Turn metadata, including `iterations`
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentResponse {
    /// Number of model round-trips the turn took
    #[must_use]
    pub fn iterations(&self) -> Option<u64> {
        self.metadata.get("iterations").and_then(serde_json::Value::as_u64)
    }
}
