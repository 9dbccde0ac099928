//! LLM call lifecycle and streaming events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::base_event::EventHeader;
use crate::impl_event;

/// Distinguishes plain completions from calls that returned tool requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmCallKind {
    /// The model answered with text.
    Completion,
    /// The model answered with one or more tool calls.
    ToolCall,
}

/// A provider call is about to go out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// Model identifier being called.
    pub model: String,
    /// How many messages the conversation holds at this point.
    pub message_count: usize,
    /// Names of the tools offered to the model.
    pub tools: Option<Vec<String>>,
    /// Correlation id shared with the matching completed/failed event.
    pub call_id: String,
}

impl LlmCallStartedEvent {
    pub fn new(
        model: String,
        message_count: usize,
        tools: Option<Vec<String>>,
        call_id: String,
    ) -> Self {
        Self {
            header: EventHeader::new("llm_call_started"),
            model,
            message_count,
            tools,
            call_id,
        }
    }
}

impl_event!(LlmCallStartedEvent);

/// A provider call returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub model: String,
    /// Whether the call came back as text or as tool calls.
    pub call_kind: LlmCallKind,
    /// The canonical response value.
    pub response: Value,
    pub call_id: String,
}

impl LlmCallCompletedEvent {
    pub fn new(model: String, call_kind: LlmCallKind, response: Value, call_id: String) -> Self {
        Self {
            header: EventHeader::new("llm_call_completed"),
            model,
            call_kind,
            response,
            call_id,
        }
    }
}

impl_event!(LlmCallCompletedEvent);

/// A provider call failed after exhausting its retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub model: String,
    pub error: String,
    pub call_id: String,
}

impl LlmCallFailedEvent {
    pub fn new(model: String, error: String, call_id: String) -> Self {
        Self {
            header: EventHeader::new("llm_call_failed"),
            model,
            error,
            call_id,
        }
    }
}

impl_event!(LlmCallFailedEvent);

/// One streamed chunk of a response. High volume; not a scope event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmStreamChunkEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// The text delta carried by this chunk.
    pub chunk: String,
    pub call_id: String,
}

impl LlmStreamChunkEvent {
    pub fn new(chunk: String, call_id: String) -> Self {
        Self {
            header: EventHeader::new("llm_stream_chunk"),
            chunk,
            call_id,
        }
    }
}

impl_event!(LlmStreamChunkEvent);
