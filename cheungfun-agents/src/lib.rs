//! Agent framework for Cheungfun.
//!
//! This crate provides a `ReAct` agent that reasons over a conversation,
//! calls tools and answers, together with the tool system and an in-memory
//! chat history it relies on.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cheungfun_agents::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example(llm: Arc<dyn cheungfun_core::traits::LanguageModel>) -> Result<()> {
//! let add = FunctionTool::from_fn(
//!     ToolMetadata::new("add", "Add two numbers").with_parameters(object_schema(
//!         &[("a", number_param("first")), ("b", number_param("second"))],
//!         &["a", "b"],
//!     )),
//!     |args| {
//!         let sum = args["a"].as_f64().unwrap_or(0.0) + args["b"].as_f64().unwrap_or(0.0);
//!         Ok(sum.to_string())
//!     },
//! );
//!
//! let tools = ToolRegistry::from_tools([Arc::new(add) as Arc<dyn Tool>])?;
//! let mut agent = ReActAgent::new(ReActConfig::new("math"), llm, tools)?;
//! let response = agent.chat("What is 2 + 3?").await?;
//! println!("{}", response.response);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod error;
pub mod memory;
pub mod prelude;
pub mod tool;
pub mod types;

pub use agent::{ReActAgent, ReActConfig, ReActStats};
pub use error::{AgentError, Result};
pub use memory::ChatMemoryBuffer;
pub use tool::{FunctionTool, Tool, ToolMetadata, ToolRegistry};
pub use types::{AgentResponse, ToolCallResult, ToolOutput};
