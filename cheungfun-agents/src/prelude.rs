//! Commonly used agent types.

pub use crate::{
    agent::react::{
        ActionStep, ObservationStep, ReActAgent, ReActChatFormatter, ReActConfig,
        ReActOutputParser, ReActStats, ReasoningStep, ResponseStep,
    },
    error::{AgentError, Result},
    memory::ChatMemoryBuffer,
    tool::{FunctionTool, Tool, ToolMetadata, ToolRegistry, number_param, object_schema, string_param},
    types::{AgentResponse, ToolCallResult, ToolOutput},
};
