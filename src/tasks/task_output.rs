//! The result of one task execution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::output_format::OutputFormat;

/// One message of the execution transcript, sanitized down to the roles
/// and fields consumers need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    /// `system`, `user`, `assistant`, or `tool`.
    pub role: String,
    /// Text content of the message.
    pub content: String,
}

/// What a task produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    /// The task's description at execution time.
    pub description: String,
    /// Task name, when one was set.
    pub name: Option<String>,
    /// The expected-output statement.
    pub expected_output: Option<String>,
    /// First ten words of the description plus an ellipsis.
    pub summary: Option<String>,
    /// The raw final answer.
    pub raw: String,
    /// Structured output, when a structured selector was set.
    pub pydantic: Option<serde_json::Value>,
    /// JSON dictionary output, when selected.
    pub json_dict: Option<HashMap<String, serde_json::Value>>,
    /// Role of the agent that produced the output.
    pub agent: String,
    /// Which representation `raw` was materialized into.
    pub output_format: OutputFormat,
    /// Sanitized conversation transcript.
    #[serde(default)]
    pub messages: Vec<TranscriptMessage>,
}

impl TaskOutput {
    /// Build an output with the summary derived from the description.
    pub fn new(description: String, agent: String, raw: String, output_format: OutputFormat) -> Self {
        let summary = Some(Self::summarize(&description));
        Self {
            description,
            name: None,
            expected_output: None,
            summary,
            raw,
            pydantic: None,
            json_dict: None,
            agent,
            output_format,
            messages: Vec::new(),
        }
    }

    /// First ten words plus an ellipsis.
    pub fn summarize(description: &str) -> String {
        let excerpt = description
            .split_whitespace()
            .take(10)
            .collect::<Vec<_>>()
            .join(" ");
        format!("{excerpt}…")
    }

    /// JSON string of the output. Errors unless the task selected JSON
    /// output.
    pub fn json(&self) -> Result<String, String> {
        if self.output_format != OutputFormat::Json {
            return Err(
                "invalid output format requested; set output_json on the task to access JSON output"
                    .to_string(),
            );
        }
        match &self.json_dict {
            Some(dict) => serde_json::to_string(dict).map_err(|e| e.to_string()),
            None => Ok("null".to_string()),
        }
    }

    /// Dictionary view, preferring `json_dict` over the structured value.
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut output = HashMap::new();
        if let Some(ref dict) = self.json_dict {
            output.extend(dict.clone());
        } else if let Some(serde_json::Value::Object(map)) = &self.pydantic {
            for (k, v) in map {
                output.insert(k.clone(), v.clone());
            }
        }
        output
    }
}

impl fmt::Display for TaskOutput {
    /// Display prefers structured output over raw, matching the
    /// dictionary view above.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref pydantic) = self.pydantic {
            write!(f, "{}", pydantic)
        } else if let Some(ref json_dict) = self.json_dict {
            write!(f, "{:?}", json_dict)
        } else {
            write!(f, "{}", self.raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_is_ten_words_and_ellipsis() {
        let description = "one two three four five six seven eight nine ten eleven twelve";
        let summary = TaskOutput::summarize(description);
        assert!(summary.starts_with("one two three four five six seven eight nine ten"));
        assert!(summary.ends_with('…'));
        assert!(!summary.contains("eleven"));
    }

    #[test]
    fn json_accessor_requires_json_format() {
        let mut output = TaskOutput::new(
            "desc".into(),
            "agent".into(),
            "{\"a\": 1}".into(),
            OutputFormat::Raw,
        );
        assert!(output.json().is_err());

        output.output_format = OutputFormat::Json;
        let mut dict = HashMap::new();
        dict.insert("a".to_string(), serde_json::json!(1));
        output.json_dict = Some(dict);
        assert_eq!(output.json().unwrap(), "{\"a\":1}");
    }

    #[test]
    fn dict_view_prefers_json_dict() {
        let mut output =
            TaskOutput::new("d".into(), "a".into(), "raw".into(), OutputFormat::Json);
        output.pydantic = Some(serde_json::json!({"from": "pydantic"}));
        let mut dict = HashMap::new();
        dict.insert("from".to_string(), serde_json::json!("json"));
        output.json_dict = Some(dict);

        assert_eq!(output.to_dict()["from"], serde_json::json!("json"));
    }
}
