//! The `ReAct` agent loop.

use super::{
    formatter::{FORMAT_CORRECTION, ReActChatFormatter, TraceNote},
    output_parser::ReActOutputParser,
    reasoning::{ActionStep, ObservationStep, ReasoningStep, ResponseStep},
};
use crate::{
    error::{AgentError, Result},
    memory::ChatMemoryBuffer,
    tool::{ToolMetadata, ToolRegistry},
    types::{AgentResponse, ToolCallResult, ToolOutput},
};
use cheungfun_core::{
    ChatMessage, MessageRole,
    traits::{BaseMemory, ChatOptions, LanguageModel, ToolDescriptor},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::HashMap, sync::Arc, time::Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// `ReAct` agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReActConfig {
    /// Agent name, used in logs
    pub name: String,
    /// Maximum number of model calls per turn
    pub max_iterations: usize,
    /// Extra context appended to the system header
    pub context: Option<String>,
    /// Role observation messages are sent with
    pub observation_role: MessageRole,
    /// Use native tool invocation when the model supports it
    pub prefer_function_calling: bool,
    /// Accept replies with no keyword at all as final answers
    pub allow_implicit_answers: bool,
    /// Replaces the default header template in text mode; used as the system
    /// message in function-calling mode
    pub system_prompt: Option<String>,
}

impl Default for ReActConfig {
    fn default() -> Self {
        Self::new("react_agent")
    }
}

impl ReActConfig {
    /// Create a new `ReAct` configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_iterations: 10,
            context: None,
            observation_role: MessageRole::User,
            prefer_function_calling: true,
            allow_implicit_answers: false,
            system_prompt: None,
        }
    }

    /// Set maximum iterations
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set extra context for the system header
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set the observation role
    #[must_use]
    pub fn with_observation_role(mut self, role: MessageRole) -> Self {
        self.observation_role = role;
        self
    }

    /// Enable or disable native tool invocation
    #[must_use]
    pub fn with_function_calling(mut self, prefer: bool) -> Self {
        self.prefer_function_calling = prefer;
        self
    }

    /// Enable or disable implicit answers
    #[must_use]
    pub fn with_implicit_answers(mut self, allow: bool) -> Self {
        self.allow_implicit_answers = allow;
        self
    }

    /// Set a custom system prompt
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AgentError::validation("name", "Agent name cannot be empty"));
        }
        if self.max_iterations == 0 {
            return Err(AgentError::validation(
                "max_iterations",
                "At least one iteration is required",
            ));
        }
        Ok(())
    }
}

/// `ReAct` agent statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReActStats {
    /// Total number of executions
    pub total_executions: u64,
    /// Number of successful executions
    pub successful_executions: u64,
    /// Number of failed executions
    pub failed_executions: u64,
    /// Total reasoning steps taken
    pub total_reasoning_steps: u64,
    /// Total tool calls made
    pub total_tool_calls: u64,
    /// Average steps per execution
    pub avg_steps_per_execution: f64,
    /// Average execution time in milliseconds
    pub avg_execution_time_ms: f64,
    /// Success rate (0.0 to 1.0)
    pub success_rate: f64,
    /// Last execution timestamp
    pub last_execution: Option<chrono::DateTime<chrono::Utc>>,
}

impl ReActStats {
    /// Update statistics after an execution
    #[allow(clippy::cast_precision_loss)]
    pub fn update_execution(
        &mut self,
        success: bool,
        steps: usize,
        tool_calls: usize,
        execution_time_ms: u64,
    ) {
        self.total_executions += 1;
        if success {
            self.successful_executions += 1;
        } else {
            self.failed_executions += 1;
        }

        self.total_reasoning_steps += steps as u64;
        self.total_tool_calls += tool_calls as u64;

        let executions = self.total_executions as f64;
        self.avg_steps_per_execution = self.total_reasoning_steps as f64 / executions;
        self.success_rate = self.successful_executions as f64 / executions;
        self.avg_execution_time_ms = (self.avg_execution_time_ms * (executions - 1.0)
            + execution_time_ms as f64)
            / executions;

        self.last_execution = Some(chrono::Utc::now());
    }
}

#[derive(Debug, Default)]
struct Turn {
    answer: Option<String>,
    tool_calls: Vec<ToolCallResult>,
    iterations: usize,
}

/// `ReAct` agent - alternates model reasoning with tool calls until it has
/// an answer.
///
/// Each [`chat`](Self::chat) call is one turn. The user message and the final
/// answer are persisted to memory; the reasoning trace lives only for the
/// turn and can be inspected afterwards with
/// [`current_reasoning`](Self::current_reasoning).
#[derive(Debug)]
pub struct ReActAgent {
    id: Uuid,
    config: ReActConfig,
    llm: Arc<dyn LanguageModel>,
    tools: Arc<ToolRegistry>,
    memory: Box<dyn BaseMemory>,
    formatter: ReActChatFormatter,
    parser: ReActOutputParser,
    current_reasoning: Vec<ReasoningStep>,
    stats: ReActStats,
}

impl ReActAgent {
    /// Create an agent with an unbounded in-memory chat history
    pub fn new(
        config: ReActConfig,
        llm: Arc<dyn LanguageModel>,
        tools: impl Into<Arc<ToolRegistry>>,
    ) -> Result<Self> {
        config.validate()?;

        let mut formatter = ReActChatFormatter::new()
            .with_context(config.context.clone())
            .with_observation_role(config.observation_role);
        if let Some(prompt) = &config.system_prompt {
            formatter = formatter.with_system_header(prompt.clone());
        }
        let parser = ReActOutputParser::new().with_implicit_answers(config.allow_implicit_answers);

        Ok(Self {
            id: Uuid::new_v4(),
            config,
            llm,
            tools: tools.into(),
            memory: Box::new(ChatMemoryBuffer::new()),
            formatter,
            parser,
            current_reasoning: Vec::new(),
            stats: ReActStats::default(),
        })
    }

    /// Replace the chat memory
    #[must_use]
    pub fn with_memory(mut self, memory: Box<dyn BaseMemory>) -> Self {
        self.memory = memory;
        self
    }

    /// Agent identifier
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the `ReAct` configuration
    #[must_use]
    pub fn config(&self) -> &ReActConfig {
        &self.config
    }

    /// Registered tools
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Chat memory
    #[must_use]
    pub fn memory(&self) -> &dyn BaseMemory {
        self.memory.as_ref()
    }

    /// Get the `ReAct` statistics
    #[must_use]
    pub fn stats(&self) -> &ReActStats {
        &self.stats
    }

    /// Reasoning trace of the last turn
    #[must_use]
    pub fn current_reasoning(&self) -> &[ReasoningStep] {
        &self.current_reasoning
    }

    /// Whether turns use native tool invocation instead of text parsing
    #[must_use]
    pub fn uses_function_calling(&self) -> bool {
        self.config.prefer_function_calling && self.llm.supports_function_calling()
    }

    /// Clear chat memory and the reasoning trace
    pub async fn reset(&mut self) -> Result<()> {
        self.memory.clear().await?;
        self.current_reasoning.clear();
        Ok(())
    }

    /// Run one turn for `message`.
    ///
    /// Tool failures are fed back to the model. Model and memory errors end
    /// the turn with an error, as does running out of iterations in
    /// function-calling mode. In text mode the turn then ends with whatever
    /// answer was recorded, possibly an empty one.
    pub async fn chat(&mut self, message: impl Into<String>) -> Result<AgentResponse> {
        let started = Instant::now();
        self.current_reasoning.clear();
        info!("ReAct agent '{}' starting turn", self.config.name);

        let result = self.run_turn(message.into()).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(turn) => {
                self.stats.update_execution(
                    true,
                    self.current_reasoning.len(),
                    turn.tool_calls.len(),
                    elapsed_ms,
                );
                info!(
                    "ReAct agent '{}' finished turn in {} iteration(s), {} tool call(s), {}ms",
                    self.config.name,
                    turn.iterations,
                    turn.tool_calls.len(),
                    elapsed_ms
                );
                Ok(self.build_response(turn, elapsed_ms))
            }
            Err(err) => {
                self.stats
                    .update_execution(false, self.current_reasoning.len(), 0, elapsed_ms);
                warn!("ReAct agent '{}' turn failed: {}", self.config.name, err);
                Err(err)
            }
        }
    }

    async fn run_turn(&mut self, message: String) -> Result<Turn> {
        self.memory.add_message(ChatMessage::user(message)).await?;
        let history = self.memory.get_messages().await?;

        let turn = if self.uses_function_calling() {
            self.run_function_calling(&history).await?
        } else {
            self.run_text(&history).await?
        };

        let answer = turn.answer.clone().unwrap_or_default();
        self.memory.add_message(ChatMessage::assistant(answer)).await?;
        Ok(turn)
    }

    async fn run_text(&mut self, history: &[ChatMessage]) -> Result<Turn> {
        let tools = self.tools.metadata();
        let mut notes: Vec<TraceNote> = Vec::new();
        let mut turn = Turn::default();

        while turn.iterations < self.config.max_iterations {
            turn.iterations += 1;
            let messages = self
                .formatter
                .format(&tools, history, &self.current_reasoning, &notes);
            let reply = self.llm.chat(&messages).await?;
            debug!("Iteration {} reply: {}", turn.iterations, reply);

            match self.parser.parse(&reply) {
                Ok(ReasoningStep::Response(step)) => {
                    turn.answer = Some(step.response.clone());
                    self.current_reasoning.push(ReasoningStep::Response(step));
                    break;
                }
                Ok(ReasoningStep::Action(step)) => {
                    let result = self
                        .call_tool(&step.action, Uuid::new_v4().to_string(), step.action_input.clone())
                        .await;
                    let ends_turn = self.record_call(ReasoningStep::Action(step), &result);
                    if ends_turn {
                        turn.answer = Some(result.output.content.clone());
                    }
                    turn.tool_calls.push(result);
                    if ends_turn {
                        break;
                    }
                }
                Ok(ReasoningStep::Observation(_)) => {
                    let err = AgentError::parse("reply is an observation, not an action or answer");
                    self.recover_from_parse_error(reply, &err, &mut notes);
                }
                Err(err) => self.recover_from_parse_error(reply, &err, &mut notes),
            }
        }

        if turn.answer.is_none() {
            warn!(
                "ReAct agent '{}' reached max iterations ({}) without an answer",
                self.config.name, self.config.max_iterations
            );
        }
        Ok(turn)
    }

    async fn run_function_calling(&mut self, history: &[ChatMessage]) -> Result<Turn> {
        let descriptors: Vec<ToolDescriptor> = self
            .tools
            .metadata()
            .iter()
            .map(ToolMetadata::to_descriptor)
            .collect();
        let options = ChatOptions {
            parallel_tool_calls: true,
            ..ChatOptions::default()
        };

        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system) = self.function_calling_system_prompt() {
            messages.push(ChatMessage::system(system));
        }
        messages.extend_from_slice(history);
        let mut turn = Turn::default();

        while turn.iterations < self.config.max_iterations {
            turn.iterations += 1;
            let reply = self
                .llm
                .chat_with_tools(&messages, &descriptors, &options)
                .await?
                .message;

            if !reply.has_tool_calls() {
                debug!("Iteration {} produced the final answer", turn.iterations);
                self.current_reasoning.push(ReasoningStep::Response(ResponseStep::new(
                    "",
                    reply.content.clone(),
                )));
                turn.answer = Some(reply.content);
                return Ok(turn);
            }

            debug!(
                "Iteration {} requested {} tool call(s)",
                turn.iterations,
                reply.tool_calls.len()
            );
            let thought = reply.content.clone();
            let calls = reply.tool_calls.clone();
            messages.push(reply);

            for call in calls {
                let (arguments, result) = match parse_call_arguments(&call.arguments) {
                    Ok(arguments) => {
                        let result = self
                            .call_tool(&call.name, call.id.clone(), arguments.clone())
                            .await;
                        (arguments, result)
                    }
                    Err(message) => (
                        Map::new(),
                        ToolCallResult {
                            tool_name: call.name.clone(),
                            call_id: call.id.clone(),
                            arguments: Value::String(call.arguments.clone()),
                            output: ToolOutput::error(message),
                            return_direct: false,
                        },
                    ),
                };

                let action = ActionStep::new(thought.clone(), call.name.clone(), arguments);
                if self.record_call(ReasoningStep::Action(action), &result) && turn.answer.is_none() {
                    turn.answer = Some(result.output.content.clone());
                }
                messages.push(ChatMessage::tool(call.id, result.output.content.clone()));
                turn.tool_calls.push(result);
            }

            if turn.answer.is_some() {
                return Ok(turn);
            }
        }

        Err(AgentError::max_iterations(self.config.max_iterations))
    }

    /// Record an action and its observation; returns whether the call ends the turn
    fn record_call(&mut self, action: ReasoningStep, result: &ToolCallResult) -> bool {
        let ends_turn = result.ends_turn();
        self.current_reasoning.push(action);
        self.current_reasoning
            .push(ReasoningStep::Observation(ObservationStep::new(
                result.output.content.clone(),
                ends_turn,
            )));
        ends_turn
    }

    fn recover_from_parse_error(&mut self, reply: String, err: &AgentError, notes: &mut Vec<TraceNote>) {
        warn!("Could not parse model reply, asking for a corrected one: {}", err);
        self.current_reasoning
            .push(ReasoningStep::Response(ResponseStep::unparsed(reply)));
        notes.push(TraceNote::new(
            self.current_reasoning.len(),
            format!("{FORMAT_CORRECTION}\n\n({err})"),
        ));
    }

    async fn call_tool(&self, name: &str, call_id: String, arguments: Map<String, Value>) -> ToolCallResult {
        let arguments = Value::Object(arguments);

        let Some(tool) = self.tools.get(name) else {
            warn!("Model requested unknown tool '{}'", name);
            let available = self.tools.tool_names().join(", ");
            return ToolCallResult {
                tool_name: name.to_string(),
                call_id,
                arguments,
                output: ToolOutput::error(format!(
                    "Tool '{name}' does not exist. Available tools: [{available}]"
                )),
                return_direct: false,
            };
        };

        let return_direct = tool.metadata().return_direct;
        let output = match self.tools.execute(name, arguments.clone()).await {
            Ok(output) => output,
            Err(err) => ToolOutput::error(format!("Error: {err}")),
        };

        ToolCallResult {
            tool_name: name.to_string(),
            call_id,
            arguments,
            output,
            return_direct,
        }
    }

    fn function_calling_system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = [self.config.system_prompt.as_deref(), self.config.context.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    fn build_response(&self, turn: Turn, elapsed_ms: u64) -> AgentResponse {
        let mode = if self.uses_function_calling() {
            "function_calling"
        } else {
            "react"
        };
        let mut metadata = HashMap::new();
        metadata.insert("iterations".to_string(), Value::from(turn.iterations));
        metadata.insert("agent".to_string(), Value::from(self.config.name.clone()));
        metadata.insert("mode".to_string(), Value::from(mode));
        metadata.insert("execution_time_ms".to_string(), Value::from(elapsed_ms));

        AgentResponse {
            response: turn.answer.unwrap_or_default(),
            sources: turn.tool_calls.iter().map(|call| call.output.clone()).collect(),
            tool_calls: turn.tool_calls,
            metadata,
        }
    }
}

fn parse_call_arguments(raw: &str) -> std::result::Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("Error: tool arguments must be a JSON object, got {other}")),
        Err(err) => Err(format!("Error: invalid tool arguments: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_validation() {
        let config = ReActConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.observation_role, MessageRole::User);
        assert!(config.prefer_function_calling);
        assert!(!config.allow_implicit_answers);
        assert!(config.validate().is_ok());

        assert!(ReActConfig::new("a").with_max_iterations(0).validate().is_err());
        assert!(ReActConfig::new("  ").validate().is_err());
    }

    #[test]
    fn test_config_deserializes_partial() {
        let config: ReActConfig =
            serde_json::from_str(r#"{"name": "math", "max_iterations": 3, "observation_role": "tool"}"#)
                .unwrap();
        assert_eq!(config.name, "math");
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.observation_role, MessageRole::Tool);
        assert!(config.prefer_function_calling);
    }

    #[test]
    fn test_stats_update() {
        let mut stats = ReActStats::default();
        stats.update_execution(true, 4, 1, 100);
        stats.update_execution(false, 2, 0, 300);

        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.total_tool_calls, 1);
        assert!((stats.avg_steps_per_execution - 3.0).abs() < f64::EPSILON);
        assert!((stats.avg_execution_time_ms - 200.0).abs() < f64::EPSILON);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
        assert!(stats.last_execution.is_some());
    }

    #[test]
    fn test_parse_call_arguments() {
        assert_eq!(parse_call_arguments("").unwrap(), Map::new());
        assert_eq!(
            Value::Object(parse_call_arguments(r#"{"a": 1}"#).unwrap()),
            serde_json::json!({"a": 1})
        );
        assert!(parse_call_arguments("[1]").is_err());
        assert!(parse_call_arguments("{broken").is_err());
    }
}
