//! `ReAct` reasoning step definitions
//!
//! A turn's trace alternates between:
//! - Action: a thought plus the tool the model wants to call
//! - Observation: what the tool returned
//! - Response: a thought plus the final answer

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single step in the `ReAct` reasoning process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReasoningStep {
    /// Tool call requested by the model
    Action(ActionStep),
    /// Result of a tool call
    Observation(ObservationStep),
    /// Answer produced by the model
    Response(ResponseStep),
}

impl ReasoningStep {
    /// Whether the step ends the turn
    #[must_use]
    pub fn is_done(&self) -> bool {
        match self {
            Self::Action(_) => false,
            Self::Observation(step) => step.return_direct,
            Self::Response(step) => !step.unparsed,
        }
    }

    /// Render the step the way it is shown to the model
    #[must_use]
    pub fn content(&self) -> String {
        match self {
            Self::Action(step) => step.content(),
            Self::Observation(step) => step.content(),
            Self::Response(step) => step.content(),
        }
    }
}

impl fmt::Display for ReasoningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content())
    }
}

/// Action step - the model asks for a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    /// Reasoning that led to the call
    pub thought: String,
    /// Tool name
    pub action: String,
    /// Tool arguments
    pub action_input: serde_json::Map<String, serde_json::Value>,
}

impl ActionStep {
    /// Create a new action step
    pub fn new(
        thought: impl Into<String>,
        action: impl Into<String>,
        action_input: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            thought: thought.into(),
            action: action.into(),
            action_input,
        }
    }

    /// Render as `Thought/Action/Action Input` lines
    #[must_use]
    pub fn content(&self) -> String {
        let input = serde_json::Value::Object(self.action_input.clone());
        format!(
            "Thought: {}\nAction: {}\nAction Input: {input}",
            self.thought, self.action
        )
    }
}

/// Observation step - the result of a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationStep {
    /// Tool output text
    pub observation: String,
    /// Whether the observation is the final answer
    pub return_direct: bool,
}

impl ObservationStep {
    /// Create a new observation step
    pub fn new(observation: impl Into<String>, return_direct: bool) -> Self {
        Self {
            observation: observation.into(),
            return_direct,
        }
    }

    /// Render as an `Observation:` line
    #[must_use]
    pub fn content(&self) -> String {
        format!("Observation: {}", self.observation)
    }
}

/// Response step - the model's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseStep {
    /// Reasoning behind the answer
    pub thought: String,
    /// Answer text
    pub response: String,
    /// Whether the answer was produced by a streaming call
    #[serde(default)]
    pub is_streaming: bool,
    /// Raw model output that could not be parsed; never a final answer
    #[serde(default)]
    pub unparsed: bool,
}

impl ResponseStep {
    /// Create a new response step
    pub fn new(thought: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            thought: thought.into(),
            response: response.into(),
            is_streaming: false,
            unparsed: false,
        }
    }

    /// Keep a reply that could not be parsed so the model sees what it wrote
    pub fn unparsed(raw: impl Into<String>) -> Self {
        Self {
            thought: String::new(),
            response: raw.into(),
            is_streaming: false,
            unparsed: true,
        }
    }

    /// Render as `Thought/Answer` lines, or the raw text when unparsed
    #[must_use]
    pub fn content(&self) -> String {
        if self.unparsed {
            self.response.clone()
        } else {
            format!("Thought: {}\nAnswer: {}", self.thought, self.response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_action_rendering() {
        let mut input = serde_json::Map::new();
        input.insert("a".into(), json!(2));
        let step = ReasoningStep::Action(ActionStep::new("I should add", "add", input));
        assert_eq!(
            step.content(),
            "Thought: I should add\nAction: add\nAction Input: {\"a\":2}"
        );
        assert!(!step.is_done());
    }

    #[test]
    fn test_observation_done_only_when_direct() {
        let plain = ReasoningStep::Observation(ObservationStep::new("5", false));
        let direct = ReasoningStep::Observation(ObservationStep::new("5", true));
        assert_eq!(plain.to_string(), "Observation: 5");
        assert!(!plain.is_done());
        assert!(direct.is_done());
    }

    #[test]
    fn test_response_rendering() {
        let answer = ReasoningStep::Response(ResponseStep::new("done", "42"));
        assert_eq!(answer.content(), "Thought: done\nAnswer: 42");
        assert!(answer.is_done());

        let raw = ReasoningStep::Response(ResponseStep::unparsed("I will help you"));
        assert_eq!(raw.content(), "I will help you");
        assert!(!raw.is_done());
    }

    #[test]
    fn test_serde_tagging() {
        let step = ReasoningStep::Observation(ObservationStep::new("ok", false));
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["type"], json!("observation"));
        let back: ReasoningStep = serde_json::from_value(value).unwrap();
        assert_eq!(back, step);
    }
}
