//! How a task's final answer is materialized.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output representation selected by the task's structured-output fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// A JSON dictionary.
    Json,
    /// A structured model value.
    Pydantic,
    /// The raw text, unprocessed.
    #[default]
    Raw,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Pydantic => write!(f, "pydantic"),
            OutputFormat::Raw => write!(f, "raw"),
        }
    }
}
