//! Guardrail evaluation events.

use serde::{Deserialize, Serialize};

use crate::events::base_event::EventHeader;
use crate::impl_event;

/// A guardrail began evaluating a candidate final answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmGuardrailStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// Human description of the guardrail being applied.
    pub guardrail: String,
    /// How many times the answer has already been retried.
    pub retry_count: i32,
}

impl LlmGuardrailStartedEvent {
    pub fn new(guardrail: String, retry_count: i32) -> Self {
        Self {
            header: EventHeader::new("llm_guardrail_started"),
            guardrail,
            retry_count,
        }
    }
}

impl_event!(LlmGuardrailStartedEvent);

/// A guardrail finished evaluating. `success` distinguishes acceptance from
/// a rejection that will trigger a re-prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmGuardrailCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub success: bool,
    /// The accepted answer or the rejection feedback.
    pub result: String,
    pub error: Option<String>,
    pub retry_count: i32,
}

impl LlmGuardrailCompletedEvent {
    pub fn new(success: bool, result: String, error: Option<String>, retry_count: i32) -> Self {
        Self {
            header: EventHeader::new("llm_guardrail_completed"),
            success,
            result,
            error,
            retry_count,
        }
    }
}

impl_event!(LlmGuardrailCompletedEvent);

/// The guardrail itself failed to run (as opposed to rejecting the answer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmGuardrailFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub error: String,
    pub retry_count: i32,
}

impl LlmGuardrailFailedEvent {
    pub fn new(error: String, retry_count: i32) -> Self {
        Self {
            header: EventHeader::new("llm_guardrail_failed"),
            error,
            retry_count,
        }
    }
}

impl_event!(LlmGuardrailFailedEvent);
