//! Collaborator traits for the Cheungfun framework.
//!
//! Workflows and agents never talk to concrete model providers or storage
//! backends directly; they go through these traits.

pub mod llm;
pub mod memory;

// Re-export all traits for convenience
pub use llm::*;
pub use memory::*;
