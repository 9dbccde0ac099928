//! Reasoning pre-step events: an agent planning before it executes.

use serde::{Deserialize, Serialize};

use crate::events::base_event::EventHeader;
use crate::impl_event;

fn reasoning_header(event_type: &str, agent_role: String, agent_id: String) -> EventHeader {
    let mut header = EventHeader::new(event_type);
    header.agent_role = Some(agent_role);
    header.agent_id = Some(agent_id);
    header.source_type = Some("agent".to_string());
    header
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReasoningStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// 1-based planning attempt.
    pub attempt: u32,
}

impl AgentReasoningStartedEvent {
    pub fn new(agent_role: String, agent_id: String, attempt: u32) -> Self {
        Self {
            header: reasoning_header("agent_reasoning_started", agent_role, agent_id),
            attempt,
        }
    }
}

impl_event!(AgentReasoningStartedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReasoningCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// The plan appended to the task description.
    pub plan: String,
}

impl AgentReasoningCompletedEvent {
    pub fn new(agent_role: String, agent_id: String, plan: String) -> Self {
        Self {
            header: reasoning_header("agent_reasoning_completed", agent_role, agent_id),
            plan,
        }
    }
}

impl_event!(AgentReasoningCompletedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReasoningFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub error: String,
}

impl AgentReasoningFailedEvent {
    pub fn new(agent_role: String, agent_id: String, error: String) -> Self {
        Self {
            header: reasoning_header("agent_reasoning_failed", agent_role, agent_id),
            error,
        }
    }
}

impl_event!(AgentReasoningFailedEvent);
