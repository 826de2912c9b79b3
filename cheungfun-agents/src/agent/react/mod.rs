//! `ReAct` (Reasoning and Acting) agent implementation
//!
//! The agent asks the model for a thought and either a tool call or an
//! answer, runs the tool, shows the model the observation and repeats until
//! an answer arrives or the iteration limit is reached. Models with native
//! tool invocation skip text parsing entirely.

pub mod agent;
pub mod formatter;
pub mod output_parser;
pub mod reasoning;

pub use agent::{ReActAgent, ReActConfig, ReActStats};
pub use formatter::{DEFAULT_REACT_HEADER, FORMAT_CORRECTION, ReActChatFormatter, TraceNote};
pub use output_parser::{IMPLICIT_THOUGHT, ReActOutputParser};
pub use reasoning::{ActionStep, ObservationStep, ReasoningStep, ResponseStep};
