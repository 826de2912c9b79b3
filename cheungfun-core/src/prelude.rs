//! Prelude module for convenient imports.
//!
//! # Examples
//!
//! ```rust
//! use cheungfun_core::prelude::*;
//!
//! let msg = ChatMessage::assistant("Thought: done\nAnswer: 42");
//! assert_eq!(msg.role, MessageRole::Assistant);
//! ```

// Re-export core error types
pub use crate::error::{CheungfunError, Result};

// Re-export all data types
pub use crate::types::{ChatMessage, MessageRole, ToolCallRequest};

// Re-export core traits
pub use crate::traits::{BaseMemory, ChatOptions, ChatResponse, LanguageModel, ToolDescriptor};
