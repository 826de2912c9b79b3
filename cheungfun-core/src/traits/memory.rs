//! Memory management traits for conversation history.
//!
//! Memory components keep the chat history an agent replays to the model on
//! every turn. Only an append-and-read log is required.

use async_trait::async_trait;

use crate::{ChatMessage, Result};

/// Base trait for conversation memory management.
///
/// # Examples
///
/// ```rust,no_run
/// use cheungfun_core::traits::BaseMemory;
/// use cheungfun_core::{ChatMessage, Result};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct SimpleMemory {
///     messages: Vec<ChatMessage>,
/// }
///
/// #[async_trait]
/// impl BaseMemory for SimpleMemory {
///     async fn get_messages(&self) -> Result<Vec<ChatMessage>> {
///         Ok(self.messages.clone())
///     }
///
///     async fn add_message(&mut self, message: ChatMessage) -> Result<()> {
///         self.messages.push(message);
///         Ok(())
///     }
///
///     async fn clear(&mut self) -> Result<()> {
///         self.messages.clear();
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait BaseMemory: Send + Sync + std::fmt::Debug {
    /// Get all messages in the conversation history, oldest first.
    async fn get_messages(&self) -> Result<Vec<ChatMessage>>;

    /// Append a message to the conversation history.
    async fn add_message(&mut self, message: ChatMessage) -> Result<()>;

    /// Append multiple messages to the conversation history.
    async fn add_messages(&mut self, messages: Vec<ChatMessage>) -> Result<()> {
        for message in messages {
            self.add_message(message).await?;
        }
        Ok(())
    }

    /// Clear all messages from the conversation history.
    async fn clear(&mut self) -> Result<()>;

    /// Get the number of messages in memory.
    async fn message_count(&self) -> Result<usize> {
        Ok(self.get_messages().await?.len())
    }

    /// Check if the memory is empty.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.message_count().await? == 0)
    }

    /// Get recent messages up to a limit.
    async fn get_recent_messages(&self, limit: usize) -> Result<Vec<ChatMessage>> {
        let messages = self.get_messages().await?;
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }
}
