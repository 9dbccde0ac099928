//! Verbose-logging events, consumed by console listeners.

use serde::{Deserialize, Serialize};

use crate::events::base_event::EventHeader;
use crate::impl_event;

/// Emitted when an agent starts and verbose logging is on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLogsStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub agent_role: String,
    pub task_description: Option<String>,
    pub verbose: bool,
}

impl AgentLogsStartedEvent {
    pub fn new(agent_role: String, task_description: Option<String>, verbose: bool) -> Self {
        let mut header = EventHeader::new("agent_logs_started");
        header.agent_role = Some(agent_role.clone());
        Self {
            header,
            agent_role,
            task_description,
            verbose,
        }
    }
}

impl_event!(AgentLogsStartedEvent);

/// Emitted per loop step when verbose logging is on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLogsExecutionEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub agent_role: String,
    /// Printable form of the step (thought, action, observation).
    pub formatted_answer: String,
    pub verbose: bool,
}

impl AgentLogsExecutionEvent {
    pub fn new(agent_role: String, formatted_answer: String, verbose: bool) -> Self {
        let mut header = EventHeader::new("agent_logs_execution");
        header.agent_role = Some(agent_role.clone());
        Self {
            header,
            agent_role,
            formatted_answer,
            verbose,
        }
    }
}

impl_event!(AgentLogsExecutionEvent);
