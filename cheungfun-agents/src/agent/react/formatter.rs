//! `ReAct` chat formatter for preparing LLM inputs
//!
//! Turns the tool list, chat history and the current reasoning trace into
//! the message list sent to the model.

use super::reasoning::ReasoningStep;
use crate::tool::ToolMetadata;
use cheungfun_core::{ChatMessage, MessageRole};

/// Default `ReAct` system header template.
///
/// Placeholders: `{tool_desc}`, `{tool_names}` and `{context}`.
pub const DEFAULT_REACT_HEADER: &str = r#"You are a helpful AI assistant that can use tools to answer questions and solve problems.

## Tools

You have access to the following tools:
{tool_desc}

## Output Format

When you need a tool, reply in exactly this format:

Thought: what you need to do next and why
Action: the tool to use, one of [{tool_names}]
Action Input: the tool arguments as a JSON object, e.g. {"query": "hello world"}

Always start with a Thought. The user will reply with:

Observation: the tool result

Repeat the Thought/Action/Action Input steps until you can answer without more tools, then reply in this format:

Thought: I can answer without using any more tools.
Answer: the final answer to the user
{context}"#;

/// Message sent back to the model when its reply could not be parsed
pub const FORMAT_CORRECTION: &str = "Your previous reply did not follow the required format. Reply either with a tool call:

Thought: what you need to do next
Action: the tool name
Action Input: the tool arguments as a JSON object

or with the final answer:

Thought: I can answer without using any more tools.
Answer: the final answer";

/// A message inserted into the projected trace after a given number of steps
#[derive(Debug, Clone, PartialEq)]
pub struct TraceNote {
    /// Number of trace steps the note follows
    pub position: usize,
    /// Note text, sent with the user role
    pub content: String,
}

impl TraceNote {
    /// Create a note following the first `position` steps
    pub fn new(position: usize, content: impl Into<String>) -> Self {
        Self {
            position,
            content: content.into(),
        }
    }
}

/// `ReAct` chat formatter for preparing LLM inputs
#[derive(Debug, Clone)]
pub struct ReActChatFormatter {
    system_header: String,
    context: Option<String>,
    observation_role: MessageRole,
}

impl Default for ReActChatFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReActChatFormatter {
    /// Create a formatter with the default header
    #[must_use]
    pub fn new() -> Self {
        Self {
            system_header: DEFAULT_REACT_HEADER.to_string(),
            context: None,
            observation_role: MessageRole::User,
        }
    }

    /// Replace the system header template
    #[must_use]
    pub fn with_system_header(mut self, header: impl Into<String>) -> Self {
        self.system_header = header.into();
        self
    }

    /// Set extra context appended to the header
    #[must_use]
    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    /// Set the role observation messages are sent with
    #[must_use]
    pub fn with_observation_role(mut self, role: MessageRole) -> Self {
        self.observation_role = role;
        self
    }

    /// The system header template
    #[must_use]
    pub fn system_header(&self) -> &str {
        &self.system_header
    }

    /// The role observation messages are sent with
    #[must_use]
    pub fn observation_role(&self) -> MessageRole {
        self.observation_role
    }

    /// Build the full message list for one model call.
    ///
    /// Trace steps become assistant messages, except observations which use
    /// the observation role. Each note is inserted right after the step it
    /// follows.
    #[must_use]
    pub fn format(
        &self,
        tools: &[ToolMetadata],
        chat_history: &[ChatMessage],
        reasoning: &[ReasoningStep],
        notes: &[TraceNote],
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(1 + chat_history.len() + reasoning.len() + notes.len());
        messages.push(ChatMessage::system(self.format_system_header(tools)));
        messages.extend_from_slice(chat_history);

        let mut notes = notes.iter().peekable();
        for position in 0..=reasoning.len() {
            while let Some(note) = notes.next_if(|n| n.position <= position) {
                messages.push(ChatMessage::user(note.content.clone()));
            }
            if let Some(step) = reasoning.get(position) {
                messages.push(self.format_step(step));
            }
        }
        messages.extend(notes.map(|n| ChatMessage::user(n.content.clone())));

        messages
    }

    /// Render the system header for the given tools
    #[must_use]
    pub fn format_system_header(&self, tools: &[ToolMetadata]) -> String {
        let tool_names = tools
            .iter()
            .map(|tool| tool.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let context = self
            .context
            .as_deref()
            .map(|c| format!("\n## Additional Context\n\n{c}\n"))
            .unwrap_or_default();

        self.system_header
            .replace("{tool_desc}", &tool_descriptions(tools))
            .replace("{tool_names}", &tool_names)
            .replace("{context}", &context)
    }

    fn format_step(&self, step: &ReasoningStep) -> ChatMessage {
        let role = match step {
            ReasoningStep::Observation(_) => self.observation_role,
            ReasoningStep::Action(_) | ReasoningStep::Response(_) => MessageRole::Assistant,
        };
        ChatMessage::new(role, step.content())
    }
}

fn tool_descriptions(tools: &[ToolMetadata]) -> String {
    if tools.is_empty() {
        return "No tools available.".to_string();
    }

    tools
        .iter()
        .map(|tool| {
            format!(
                "> Tool Name: {}\nTool Description: {}\nTool Args: {}\n",
                tool.name,
                tool.description,
                tool.parameters_json()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
