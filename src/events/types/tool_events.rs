//! Tool usage events: the started/finished/error scope plus the
//! non-scoped validation and selection failures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::base_event::EventHeader;
use crate::impl_event;

/// A tool invocation began.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUsageStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub tool_name: String,
    /// Arguments as parsed from the model's request.
    pub tool_args: Value,
    /// 1-based attempt number for this invocation.
    pub attempt: u32,
}

impl ToolUsageStartedEvent {
    pub fn new(tool_name: String, tool_args: Value, attempt: u32) -> Self {
        Self {
            header: EventHeader::new("tool_usage_started"),
            tool_name,
            tool_args,
            attempt,
        }
    }
}

impl_event!(ToolUsageStartedEvent);

/// A tool invocation returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUsageFinishedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub tool_name: String,
    /// The observation fed back to the model.
    pub output: String,
    /// Whether the result came out of the tool cache.
    pub from_cache: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ToolUsageFinishedEvent {
    pub fn new(
        tool_name: String,
        output: String,
        from_cache: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            header: EventHeader::new("tool_usage_finished"),
            tool_name,
            output,
            from_cache,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

impl_event!(ToolUsageFinishedEvent);

/// A tool invocation failed. Closes the usage scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUsageErrorEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub tool_name: String,
    pub error: String,
    pub attempt: u32,
}

impl ToolUsageErrorEvent {
    pub fn new(tool_name: String, error: String, attempt: u32) -> Self {
        Self {
            header: EventHeader::new("tool_usage_error"),
            tool_name,
            error,
            attempt,
        }
    }
}

impl_event!(ToolUsageErrorEvent);

/// The model's arguments did not parse against the tool schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolValidateInputErrorEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub tool_name: String,
    pub error: String,
}

impl ToolValidateInputErrorEvent {
    pub fn new(tool_name: String, error: String) -> Self {
        Self {
            header: EventHeader::new("tool_validate_input_error"),
            tool_name,
            error,
        }
    }
}

impl_event!(ToolValidateInputErrorEvent);

/// The model asked for a tool that is not registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSelectionErrorEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub requested_tool: String,
    pub available_tools: Vec<String>,
}

impl ToolSelectionErrorEvent {
    pub fn new(requested_tool: String, available_tools: Vec<String>) -> Self {
        Self {
            header: EventHeader::new("tool_selection_error"),
            requested_tool,
            available_tools,
        }
    }
}

impl_event!(ToolSelectionErrorEvent);

/// The tool body itself panicked or returned an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionErrorEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub tool_name: String,
    pub error: String,
}

impl ToolExecutionErrorEvent {
    pub fn new(tool_name: String, error: String) -> Self {
        Self {
            header: EventHeader::new("tool_execution_error"),
            tool_name,
            error,
        }
    }
}

impl_event!(ToolExecutionErrorEvent);
