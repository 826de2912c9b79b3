//! Language-model collaborator interface.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::{ChatMessage, CheungfunError, Result};

/// Description of a tool advertised to a model with native tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, unique within one request
    pub name: String,
    /// Human readable description
    pub description: String,
    /// JSON schema of the tool parameters
    pub parameters: serde_json::Value,
}

/// Options for a tool-enabled chat request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Allow the model to request several tools in one reply
    pub parallel_tool_calls: bool,
}

/// Reply of a tool-enabled chat request.
///
/// The message content may be empty when the model only declared tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Assistant message, possibly carrying tool calls
    pub message: ChatMessage,
}

impl ChatResponse {
    /// Wrap an assistant message.
    #[must_use]
    pub fn new(message: ChatMessage) -> Self {
        Self { message }
    }

    /// Text of the reply, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        if self.message.content.is_empty() {
            None
        } else {
            Some(&self.message.content)
        }
    }
}

/// A large-language-model client.
///
/// Implementations must honor cancellation by being cancel-safe: callers may
/// drop the returned future at any await point.
#[async_trait]
pub trait LanguageModel: Send + Sync + std::fmt::Debug {
    /// Complete a single prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Answer a conversation.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Stream the completion of a prompt as text deltas.
    ///
    /// The default implementation yields the whole completion as one delta.
    async fn stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let text = self.complete(prompt).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }

    /// Whether the model supports native tool invocation.
    fn supports_function_calling(&self) -> bool {
        false
    }

    /// Answer a conversation with tools available for native invocation.
    async fn chat_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolDescriptor],
        _options: &ChatOptions,
    ) -> Result<ChatResponse> {
        Err(CheungfunError::unsupported("chat_with_tools"))
    }
}
