//! # Cheungfun
//!
//! Event-driven workflows and `ReAct` agents for LLM applications, built on
//! async Rust.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cheungfun::prelude::*;
//! use serde_json::json;
//!
//! # async fn example() {
//! let mut workflow = Workflow::new("echo");
//! workflow.add_step(EventKind::START, |_ctx, event| async move {
//!     let input = START.extract(&event).map(|s| s.input).unwrap_or_default();
//!     Ok(vec![STOP.with(StopEvent::new(input))])
//! });
//!
//! let result = workflow.run(StartEvent::new(json!("hello"))).await;
//! assert!(result.is_success());
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **cheungfun-core**: Shared errors, chat types and the LLM/memory traits
//! - **cheungfun-workflow**: Event-driven workflow runtime
//! - **cheungfun-agents**: `ReAct` agent, tools and chat memory

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export all public APIs from sub-crates
pub use cheungfun_agents as agents;
pub use cheungfun_core as core;
pub use cheungfun_workflow as workflow;

/// Prelude module for convenient imports.
///
/// Error types are re-exported, but the per-crate `Result` aliases are not;
/// use the crate paths for those.
pub mod prelude {
    pub use cheungfun_core::prelude::{
        BaseMemory, ChatMessage, ChatOptions, ChatResponse, CheungfunError, LanguageModel,
        MessageRole, ToolCallRequest, ToolDescriptor,
    };

    pub use cheungfun_workflow::prelude::{
        BoxedHandler, Context, ERROR, ErrorEvent, Event, EventFactory, EventKind, HUMAN_RESPONSE,
        Handler, HumanResponseEvent, INPUT_REQUIRED, InputRequiredEvent, RetryConfig, RetryPolicy,
        RunResult, START, STOP, StartEvent, StateStore, StepConfig, StopEvent, Workflow,
        WorkflowConfig, WorkflowError, WorkflowHook, WorkflowStream, handler_fn,
    };

    pub use cheungfun_agents::prelude::{
        AgentError, AgentResponse, ChatMemoryBuffer, FunctionTool, ReActAgent, ReActConfig,
        ReasoningStep, Tool, ToolCallResult, ToolMetadata, ToolOutput, ToolRegistry,
    };
}

/// Version information for the Cheungfun framework.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
