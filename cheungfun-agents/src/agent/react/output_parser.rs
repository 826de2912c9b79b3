//! `ReAct` output parser for processing LLM responses
//!
//! A reply is either an action (`Thought`/`Action`/`Action Input`) or an
//! answer (`Thought`/`Answer`). Keywords only count at the start of a line
//! and are case-sensitive. When both `Action:` and `Answer:` appear, the one
//! appearing first wins.

use super::reasoning::{ActionStep, ReasoningStep, ResponseStep};
use crate::error::{AgentError, Result};
use regex::Regex;
use serde_json::{Map, Value};

/// Thought recorded for replies accepted as implicit answers
pub const IMPLICIT_THOUGHT: &str = "(Implicit) I can answer without any more tools!";

/// `ReAct` output parser for processing LLM responses
#[derive(Debug, Clone)]
pub struct ReActOutputParser {
    thought: Regex,
    action: Regex,
    action_input: Regex,
    answer: Regex,
    next_section: Regex,
    pair: Regex,
    allow_implicit_answers: bool,
}

impl Default for ReActOutputParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReActOutputParser {
    /// Create a parser that rejects replies without keywords
    #[must_use]
    pub fn new() -> Self {
        Self {
            thought: Regex::new(r"(?m)^[ \t]*Thought:").expect("Invalid thought regex"),
            action: Regex::new(r"(?m)^[ \t]*Action:[ \t]*([^\s()]*)").expect("Invalid action regex"),
            action_input: Regex::new(r"(?m)^[ \t]*Action Input:").expect("Invalid action input regex"),
            answer: Regex::new(r"(?m)^[ \t]*(?:Final )?Answer:").expect("Invalid answer regex"),
            next_section: Regex::new(r"(?m)^[ \t]*(?:Observation|Thought|Action|Answer|Final Answer):")
                .expect("Invalid section regex"),
            pair: Regex::new(r#""(\w+)"\s*:\s*"([^"]*)""#).expect("Invalid pair regex"),
            allow_implicit_answers: false,
        }
    }

    /// Accept replies with no keyword at all as answers
    #[must_use]
    pub fn with_implicit_answers(mut self, allow: bool) -> Self {
        self.allow_implicit_answers = allow;
        self
    }

    /// Parse one model reply into an action or response step
    pub fn parse(&self, output: &str) -> Result<ReasoningStep> {
        let action = self.action.captures(output);
        let answer = self.answer.find(output);

        match (action, answer) {
            (Some(action), Some(answer)) if action.get(0).map_or(0, |m| m.start()) < answer.start() => {
                self.parse_action(output, &action)
            }
            (Some(action), None) => self.parse_action(output, &action),
            (_, Some(answer)) => Ok(ReasoningStep::Response(ResponseStep::new(
                self.thought_before(output, answer.start()),
                output[answer.end()..].trim(),
            ))),
            (None, None) => {
                if self.allow_implicit_answers && !self.thought.is_match(output) {
                    Ok(ReasoningStep::Response(ResponseStep::new(
                        IMPLICIT_THOUGHT,
                        output.trim(),
                    )))
                } else {
                    Err(AgentError::parse(format!(
                        "reply contains neither 'Action:' nor 'Answer:': {}",
                        output.trim()
                    )))
                }
            }
        }
    }

    fn parse_action(&self, output: &str, captures: &regex::Captures<'_>) -> Result<ReasoningStep> {
        let (start, end) = captures.get(0).map_or((0, 0), |m| (m.start(), m.end()));
        let name = captures.get(1).map_or("", |m| m.as_str());
        if name.is_empty() {
            return Err(AgentError::parse("'Action:' line does not name a tool"));
        }

        let rest = &output[end..];
        let input_kw = self.action_input.find(rest).ok_or_else(|| {
            AgentError::parse(format!("missing 'Action Input:' for action '{name}'"))
        })?;
        let region = &rest[input_kw.end()..];
        let region = match self.next_section.find(region) {
            Some(next) => &region[..next.start()],
            None => region,
        };

        let action_input = self.parse_action_input(extract_json_object(region.trim()))?;
        Ok(ReasoningStep::Action(ActionStep::new(
            self.thought_before(output, start),
            name,
            action_input,
        )))
    }

    /// Parse action input into an argument map.
    ///
    /// Tries strict JSON, then JSON with single quotes swapped for double
    /// quotes, then a scan for `"key":"value"` pairs. Empty input and `{}`
    /// yield an empty map.
    pub fn parse_action_input(&self, raw: &str) -> Result<Map<String, Value>> {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) {
            return Ok(map);
        }

        let swapped = raw.replace('\'', "\"");
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&swapped) {
            return Ok(map);
        }

        let pairs: Map<String, Value> = self
            .pair
            .captures_iter(&swapped)
            .map(|c| (c[1].to_string(), Value::String(c[2].to_string())))
            .collect();
        if !pairs.is_empty() {
            return Ok(pairs);
        }

        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "{}" {
            return Ok(Map::new());
        }

        Err(AgentError::parse(format!("invalid action input: {trimmed}")))
    }

    fn thought_before(&self, output: &str, end: usize) -> String {
        let head = &output[..end];
        match self.thought.find(head) {
            Some(m) => head[m.end()..].trim().to_string(),
            None => head.trim().to_string(),
        }
    }
}

fn extract_json_object(raw: &str) -> &str {
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    fn action(output: &str) -> ActionStep {
        match ReActOutputParser::new().parse(output).unwrap() {
            ReasoningStep::Action(step) => step,
            other => panic!("expected action, got {other:?}"),
        }
    }

    fn response(output: &str) -> ResponseStep {
        match ReActOutputParser::new().parse(output).unwrap() {
            ReasoningStep::Response(step) => step,
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_action() {
        let step = action("Thought: I need to add\nAction: add\nAction Input: {\"a\": 2, \"b\": 3}");
        assert_eq!(step.thought, "I need to add");
        assert_eq!(step.action, "add");
        assert_eq!(Value::Object(step.action_input), json!({"a": 2, "b": 3}));
    }

    #[test]
    fn test_parse_action_stops_at_hallucinated_observation() {
        let step = action(
            "Thought: search\nAction: search\nAction Input: {\"q\": \"rust\"}\nObservation: {\"fake\": 1}",
        );
        assert_eq!(Value::Object(step.action_input), json!({"q": "rust"}));
    }

    #[test_case("Action: add(a, b)\nAction Input: {}", "add" ; "stops at parenthesis")]
    #[test_case("Action:   lookup  extra\nAction Input: {}", "lookup" ; "stops at whitespace")]
    fn test_action_name_token(output: &str, expected: &str) {
        assert_eq!(action(output).action, expected);
    }

    #[test]
    fn test_parse_answer() {
        let step = response("Thought: done\nAnswer: 42");
        assert_eq!(step.thought, "done");
        assert_eq!(step.response, "42");

        let multi = response("Thought: summary\nFinal Answer: line one\nline two");
        assert_eq!(multi.response, "line one\nline two");
    }

    #[test]
    fn test_lower_offset_wins() {
        let step = response("Thought: known\nAnswer: 7\nAction: add\nAction Input: {}");
        assert_eq!(step.response, "7\nAction: add\nAction Input: {}");

        let step = action("Thought: t\nAction: add\nAction Input: {}\nAnswer: 7");
        assert_eq!(step.action, "add");
    }

    #[test_case("I will help you" ; "no keywords")]
    #[test_case("Thought: hmm, let me think" ; "thought only")]
    #[test_case("thought: ok\nanswer: 1" ; "keywords are case sensitive")]
    #[test_case("The Answer: 1 is mid-line" ; "keywords are line anchored")]
    #[test_case("Thought: x\nAction: add" ; "action without input")]
    #[test_case("Thought: x\nAction:\nAction Input: {}" ; "action without name")]
    #[test_case("Thought: x\nAction: add\nAction Input: not json" ; "unparseable input")]
    fn test_parse_failures(output: &str) {
        let err = ReActOutputParser::new().parse(output).unwrap_err();
        assert_eq!(err.category(), "parse");
    }

    #[test]
    fn test_implicit_answers() {
        let parser = ReActOutputParser::new().with_implicit_answers(true);
        match parser.parse("  The capital is Paris.  ").unwrap() {
            ReasoningStep::Response(step) => {
                assert_eq!(step.thought, IMPLICIT_THOUGHT);
                assert_eq!(step.response, "The capital is Paris.");
            }
            other => panic!("expected response, got {other:?}"),
        }
        assert!(parser.parse("Thought: only thinking").is_err());
    }

    #[test_case(r#"{"a": 1}"#, json!({"a": 1}) ; "strict json")]
    #[test_case("{'city': 'Paris'}", json!({"city": "Paris"}) ; "single quotes")]
    #[test_case(r#"{"city": "Paris", "note": "it's "fine"}"#, json!({"city": "Paris", "note": "it"}) ; "pair scanner")]
    #[test_case("", json!({}) ; "empty")]
    #[test_case("{}", json!({}) ; "empty object")]
    fn test_parse_action_input(raw: &str, expected: Value) {
        let parsed = ReActOutputParser::new().parse_action_input(raw).unwrap();
        assert_eq!(Value::Object(parsed), expected);
    }

    #[test]
    fn test_parse_action_input_rejects_non_objects() {
        let parser = ReActOutputParser::new();
        assert!(parser.parse_action_input("[1, 2]").is_err());
        assert!(parser.parse_action_input("hello").is_err());
    }
}
