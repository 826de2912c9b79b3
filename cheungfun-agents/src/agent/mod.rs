//! Agent implementations.

pub mod react;

pub use react::{ReActAgent, ReActConfig, ReActStats};
