//! # Cheungfun Core
//!
//! Core traits, types, and interfaces shared by Cheungfun workflows and agents.
//!
//! This crate provides:
//!
//! - **Data structures**: `ChatMessage`, `MessageRole` and tool-call requests
//! - **Collaborator traits**: `LanguageModel` for model clients and
//!   `BaseMemory` for conversation history
//! - **Error handling**: `CheungfunError` with context-aware variants
//!
//! ## Quick Start
//!
//! ```rust
//! use cheungfun_core::prelude::*;
//!
//! let question = ChatMessage::user("What is 2 + 3?");
//! assert_eq!(question.role, MessageRole::User);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used types and traits
pub mod prelude;

// Core modules
pub mod error;
pub mod traits;
pub mod types;

// Re-export key types at crate root for convenience
pub use error::{CheungfunError, Result};
pub use types::{ChatMessage, MessageRole, ToolCallRequest};

// Re-export traits for convenience
pub use traits::*;

/// Version information for the Cheungfun core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the Cheungfun core library.
pub const NAME: &str = env!("CARGO_PKG_NAME");
