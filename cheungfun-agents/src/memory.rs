//! In-memory chat history.

use async_trait::async_trait;
use cheungfun_core::{ChatMessage, Result, traits::BaseMemory};
use tracing::debug;

/// Chat history kept in a `Vec`, optionally capped.
///
/// When the cap is exceeded the oldest messages are evicted first.
#[derive(Debug, Clone, Default)]
pub struct ChatMemoryBuffer {
    messages: Vec<ChatMessage>,
    max_messages: Option<usize>,
}

impl ChatMemoryBuffer {
    /// Create an unbounded buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer holding at most `max_messages` messages.
    ///
    /// The cap is at least one, so the latest message is always kept.
    #[must_use]
    pub fn with_max_messages(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages: Some(max_messages.max(1)),
        }
    }

    /// The message cap, if any
    #[must_use]
    pub fn max_messages(&self) -> Option<usize> {
        self.max_messages
    }

    fn evict(&mut self) {
        if let Some(max) = self.max_messages {
            let excess = self.messages.len().saturating_sub(max);
            if excess > 0 {
                debug!("Evicting {} oldest message(s) from chat memory", excess);
                self.messages.drain(..excess);
            }
        }
    }
}

#[async_trait]
impl BaseMemory for ChatMemoryBuffer {
    async fn get_messages(&self) -> Result<Vec<ChatMessage>> {
        Ok(self.messages.clone())
    }

    async fn add_message(&mut self, message: ChatMessage) -> Result<()> {
        self.messages.push(message);
        self.evict();
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        self.messages.clear();
        Ok(())
    }

    async fn message_count(&self) -> Result<usize> {
        Ok(self.messages.len())
    }
}
