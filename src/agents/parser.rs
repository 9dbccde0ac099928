//! ReAct output parsing.
//!
//! Model output in the ReAct protocol is either an action:
//!
//! ```text
//! Thought: I should look this up
//! Action: search
//! Action Input: {"query": "temperature in SF"}
//! ```
//!
//! or a final answer:
//!
//! ```text
//! Thought: I know the answer
//! Final Answer: 72 degrees
//! ```
//!
//! Anything else is a parse error carrying a correction hint that gets
//! fed back to the model.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

const FINAL_ANSWER_MARKER: &str = "Final Answer:";

static ACTION_WITH_INPUT: Lazy<Regex> = Lazy::new(|| {
    // Tolerates numbered variants ("Action 2:") the models sometimes emit.
    Regex::new(r"(?s)Action\s*\d*\s*:\s*(.+?)\s*(?:\n|\r\n?)Action\s*\d*\s*Input\s*\d*\s*:\s*(.*)")
        .expect("literal regex")
});
static ACTION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Action\s*\d*\s*:").expect("literal regex"));
static ACTION_INPUT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Action\s*\d*\s*Input\s*\d*\s*:").expect("literal regex"));

/// A parsed tool request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAction {
    /// The reasoning preceding the action.
    pub thought: String,
    /// Requested tool name.
    pub tool: String,
    /// Raw tool input (usually JSON, sometimes plain text).
    pub tool_input: String,
    /// The unparsed model output.
    pub text: String,
}

/// A parsed final answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentFinish {
    /// The reasoning preceding the answer.
    pub thought: String,
    /// The answer itself.
    pub output: Value,
    /// The unparsed model output.
    pub text: String,
}

/// Either of the two valid shapes.
#[derive(Debug, Clone)]
pub enum ParsedStep {
    Action(AgentAction),
    Finish(AgentFinish),
}

/// Raised when the output matches neither shape. The message doubles as
/// the correction hint appended to the conversation.
#[derive(Debug, Clone)]
pub struct OutputParserError {
    pub error: String,
}

impl OutputParserError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl fmt::Display for OutputParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for OutputParserError {}

/// Parse a ReAct response. A `Final Answer:` wins over any `Action:`
/// earlier in the same text.
pub fn parse_react(text: &str) -> Result<ParsedStep, OutputParserError> {
    let thought = extract_thought(text);

    if text.contains(FINAL_ANSWER_MARKER) {
        let answer = text
            .rsplit(FINAL_ANSWER_MARKER)
            .next()
            .unwrap_or_default()
            .trim();
        let answer = strip_trailing_fence(answer);
        return Ok(ParsedStep::Finish(AgentFinish {
            thought,
            output: Value::String(answer),
            text: text.to_string(),
        }));
    }

    if let Some(captures) = ACTION_WITH_INPUT.captures(text) {
        let tool = captures
            .get(1)
            .map_or("", |m| m.as_str())
            .trim()
            .trim_matches('*')
            .trim()
            .to_string();
        let raw_input = captures.get(2).map_or("", |m| m.as_str()).trim();
        let tool_input = repair_tool_input(raw_input.trim_matches('"'));
        return Ok(ParsedStep::Action(AgentAction {
            thought,
            tool,
            tool_input,
            text: text.to_string(),
        }));
    }

    if !ACTION_MARKER.is_match(text) {
        return Err(OutputParserError::new(
            "I couldn't find an Action after the Thought.\nYou MUST use one of these formats:\n\
             Thought: [your thought]\nAction: [tool name]\nAction Input: [JSON arguments]\n\
             or\nThought: [your thought]\nFinal Answer: [your final answer]",
        ));
    }
    if !ACTION_INPUT_MARKER.is_match(text) {
        return Err(OutputParserError::new(
            "I found an Action but no valid Action Input right after it.\n\
             After 'Action:' you MUST provide 'Action Input:' with a JSON object.",
        ));
    }
    Err(OutputParserError::new(
        "Could not parse the output. Use 'Action:'/'Action Input:' or 'Final Answer:'.",
    ))
}

/// Everything before the first `Action`/`Final Answer` line, fences
/// removed.
fn extract_thought(text: &str) -> String {
    let cut = text.find("\nAction").or_else(|| text.find("\nFinal Answer"));
    match cut {
        Some(index) => text[..index].trim().replace("```", "").trim().to_string(),
        None => String::new(),
    }
}

/// Drop an unmatched trailing code fence after a final answer.
fn strip_trailing_fence(text: &str) -> String {
    if text.ends_with("```") && text.matches("```").count() % 2 != 0 {
        text[..text.len() - 3].trim_end().to_string()
    } else {
        text.to_string()
    }
}

/// Best-effort cleanup of model-mangled JSON inputs: triple quotes to
/// single, keeping the original when the repair does not parse either.
/// Array inputs are passed through untouched.
fn repair_tool_input(input: &str) -> String {
    if input.starts_with('[') && input.ends_with(']') {
        return input.to_string();
    }
    let repaired = input.replace("\"\"\"", "\"");
    if serde_json::from_str::<Value>(&repaired).is_ok() {
        repaired
    } else {
        input.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_final_answer() {
        let text = "Thought: I know it\nFinal Answer: 72 degrees.";
        match parse_react(text).unwrap() {
            ParsedStep::Finish(finish) => {
                assert_eq!(finish.output, Value::String("72 degrees.".into()));
                assert_eq!(finish.thought, "Thought: I know it");
            }
            _ => panic!("expected a final answer"),
        }
    }

    #[test]
    fn parses_an_action_with_json_input() {
        let text = "Thought: search first\nAction: search\nAction Input: {\"query\": \"SF weather\"}";
        match parse_react(text).unwrap() {
            ParsedStep::Action(action) => {
                assert_eq!(action.tool, "search");
                let parsed: Value = serde_json::from_str(&action.tool_input).unwrap();
                assert_eq!(parsed["query"], "SF weather");
            }
            _ => panic!("expected an action"),
        }
    }

    #[test]
    fn final_answer_beats_an_earlier_action() {
        let text = "Action: search\nAction Input: {}\nThought: never mind\nFinal Answer: done";
        assert!(matches!(
            parse_react(text).unwrap(),
            ParsedStep::Finish(_)
        ));
    }

    #[test]
    fn numbered_markers_parse() {
        let text = "Thought: step\nAction 2: lookup\nAction 2 Input 2: {\"k\": 1}";
        match parse_react(text).unwrap() {
            ParsedStep::Action(action) => assert_eq!(action.tool, "lookup"),
            _ => panic!("expected an action"),
        }
    }

    #[test]
    fn trailing_fence_is_stripped() {
        let text = "Thought: ok\nFinal Answer: here it is\n```";
        match parse_react(text).unwrap() {
            ParsedStep::Finish(finish) => {
                assert_eq!(finish.output, Value::String("here it is".into()));
            }
            _ => panic!("expected a final answer"),
        }
    }

    #[test]
    fn missing_action_is_an_error_with_a_hint() {
        let err = parse_react("Thought: hmm, what now").unwrap_err();
        assert!(err.error.contains("Final Answer"));
    }

    #[test]
    fn action_without_input_is_an_error() {
        let err = parse_react("Thought: go\nAction: search").unwrap_err();
        assert!(err.error.contains("Action Input"));
    }

    #[test]
    fn triple_quoted_input_is_repaired() {
        let text = "Thought: t\nAction: a\nAction Input: {\"\"\"k\"\"\": \"v\"}";
        match parse_react(text).unwrap() {
            ParsedStep::Action(action) => {
                assert!(serde_json::from_str::<Value>(&action.tool_input).is_ok());
            }
            _ => panic!("expected an action"),
        }
    }
}
