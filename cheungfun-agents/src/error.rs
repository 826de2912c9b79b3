//! Error types for the Cheungfun agents framework.

use cheungfun_core::CheungfunError;
use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors raised while running an agent turn
#[derive(Error, Debug)]
pub enum AgentError {
    /// Core Cheungfun errors, including LLM and memory failures
    #[error("Core error: {0}")]
    Core(#[from] CheungfunError),

    /// Agent configuration errors
    #[error("Agent configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Agent execution errors
    #[error("Agent execution error: {message}")]
    Execution {
        /// Error message
        message: String,
    },

    /// Tool-related errors
    #[error("Tool error: {tool_name} - {message}")]
    Tool {
        /// Tool name
        tool_name: String,
        /// Error message
        message: String,
    },

    /// The model reply matched neither the action nor the answer shape
    #[error("Could not parse model output: {message}")]
    Parse {
        /// Error message
        message: String,
    },

    /// The function-calling loop did not produce an answer in time
    #[error("Reached max iterations ({max_iterations}) without a final answer")]
    MaxIterations {
        /// Configured iteration limit
        max_iterations: usize,
    },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation {
        /// Field that failed validation
        field: String,
        /// Error message
        message: String,
    },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic errors
    #[error("Agent error: {message}")]
    Generic {
        /// Error message
        message: String,
    },
}

impl AgentError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Create a tool error
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a max-iterations error
    #[must_use]
    pub fn max_iterations(max_iterations: usize) -> Self {
        Self::MaxIterations { max_iterations }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if this is a retryable error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Core(err) => err.is_retryable(),
            Self::Tool { .. } | Self::Parse { .. } => true,
            _ => false,
        }
    }

    /// Get the error category for logging/metrics
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Core(_) => "core",
            Self::Configuration { .. } => "configuration",
            Self::Execution { .. } => "execution",
            Self::Tool { .. } => "tool",
            Self::Parse { .. } => "parse",
            Self::MaxIterations { .. } => "max_iterations",
            Self::Validation { .. } => "validation",
            Self::Serialization(_) => "serialization",
            Self::Generic { .. } => "generic",
        }
    }
}

// Convert from anyhow errors
impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::generic(format!("Anyhow error: {err}"))
    }
}
