//! The result of a crew run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::tasks::output_format::OutputFormat;
use crate::tasks::task_output::TaskOutput;
use crate::types::usage_metrics::UsageMetrics;

/// Everything a kickoff produced: the final raw/structured output, every
/// task's output in execution order, and the aggregated usage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrewOutput {
    /// Raw text of the last non-empty task output.
    pub raw: String,
    /// Structured value of the final output, when one was materialized.
    pub pydantic: Option<serde_json::Value>,
    /// JSON dictionary of the final output, when one was materialized.
    pub json_dict: Option<HashMap<String, serde_json::Value>>,
    /// Per-task outputs in execution order.
    pub tasks_output: Vec<TaskOutput>,
    /// Usage summed across the crew's agents.
    pub token_usage: UsageMetrics,
}

impl CrewOutput {
    pub fn new(raw: String, tasks_output: Vec<TaskOutput>, token_usage: UsageMetrics) -> Self {
        Self {
            raw,
            pydantic: None,
            json_dict: None,
            tasks_output,
            token_usage,
        }
    }

    /// JSON string of the final output. Errors unless the final task
    /// selected JSON output.
    pub fn json(&self) -> Result<String, String> {
        if let Some(last) = self.tasks_output.last() {
            if last.output_format != OutputFormat::Json {
                return Err(
                    "no JSON output in the final task; set output_json on the final task"
                        .to_string(),
                );
            }
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

impl fmt::Display for CrewOutput {
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
