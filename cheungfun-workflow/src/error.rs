//! Error types for the Cheungfun workflow runtime.

use thiserror::Error;

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors raised by handlers and by the runtime itself.
///
/// The type is `Clone` so an error can travel inside an error event payload
/// and still be reported as the run error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    /// A handler reported a failure
    #[error("Handler error: {message}")]
    Handler {
        /// Error message
        message: String,
    },

    /// A step failed with a non-retryable error
    #[error("Step '{step}' failed: {source}")]
    Step {
        /// Step name
        step: String,
        /// Underlying failure
        #[source]
        source: Box<WorkflowError>,
    },

    /// A step kept failing until its retry policy gave up
    #[error("Step '{step}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Step name
        step: String,
        /// Number of attempts made
        attempts: u32,
        /// Last failure
        #[source]
        source: Box<WorkflowError>,
    },

    /// A handler panicked and the recovery middleware caught it
    #[error("Handler panicked: {message}")]
    Panic {
        /// Panic payload rendered as text
        message: String,
    },

    /// The run exceeded its timeout
    #[error("Workflow timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds
        timeout_ms: u64,
    },

    /// The run was cancelled
    #[error("Workflow cancelled")]
    Cancelled,

    /// Invalid workflow or step configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },
}

impl WorkflowError {
    /// Create a handler error
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Wrap a failure with the name of the step that produced it
    pub fn step(step: impl Into<String>, source: WorkflowError) -> Self {
        Self::Step {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Create a retries-exhausted error
    pub fn retries_exhausted(step: impl Into<String>, attempts: u32, source: WorkflowError) -> Self {
        Self::RetriesExhausted {
            step: step.into(),
            attempts,
            source: Box::new(source),
        }
    }

    /// Create a panic error
    pub fn panic(message: impl Into<String>) -> Self {
        Self::Panic {
            message: message.into(),
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if this error may succeed when the handler runs again.
    ///
    /// Timeouts, cancellation and configuration problems never do.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Timeout { .. } | Self::Cancelled | Self::Configuration { .. }
        )
    }

    /// Check if this error terminates the run regardless of retry policy
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled)
    }

    /// The innermost error, unwrapping step and retry wrappers
    #[must_use]
    pub fn root_cause(&self) -> &WorkflowError {
        match self {
            Self::Step { source, .. } | Self::RetriesExhausted { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Handler { .. } => "handler",
            Self::Step { .. } => "step",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::Panic { .. } => "panic",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Configuration { .. } => "configuration",
            Self::Serialization { .. } => "serialization",
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for WorkflowError {
    fn from(err: anyhow::Error) -> Self {
        Self::handler(format!("{err:#}"))
    }
}
