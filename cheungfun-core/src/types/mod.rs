//! Core data types for the Cheungfun framework.
//!
//! This module contains the conversation types exchanged with language-model
//! and memory collaborators.

pub mod chat;

// Re-export all types for convenience
pub use chat::*;
