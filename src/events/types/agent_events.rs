//! Agent lifecycle events: crew-bound execution, standalone (lite)
//! execution, and evaluation.

use serde::{Deserialize, Serialize};

use crate::events::base_event::EventHeader;
use crate::impl_event;

/// An agent began executing a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// The fully assembled task prompt.
    pub task_prompt: String,
    /// Tools made available for this execution.
    pub tools: Option<Vec<String>>,
}

impl AgentExecutionStartedEvent {
    pub fn new(
        agent_role: String,
        agent_id: String,
        task_prompt: String,
        tools: Option<Vec<String>>,
    ) -> Self {
        let mut header = EventHeader::new("agent_execution_started");
        header.agent_role = Some(agent_role);
        header.agent_id = Some(agent_id);
        header.source_type = Some("agent".to_string());
        Self {
            header,
            task_prompt,
            tools,
        }
    }
}

impl_event!(AgentExecutionStartedEvent);

/// An agent produced a final answer for its task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// The final answer text.
    pub output: String,
}

impl AgentExecutionCompletedEvent {
    pub fn new(agent_role: String, agent_id: String, output: String) -> Self {
        let mut header = EventHeader::new("agent_execution_completed");
        header.agent_role = Some(agent_role);
        header.agent_id = Some(agent_id);
        header.source_type = Some("agent".to_string());
        Self { header, output }
    }
}

impl_event!(AgentExecutionCompletedEvent);

/// An agent's execution ended in an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionErrorEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub error: String,
}

impl AgentExecutionErrorEvent {
    pub fn new(agent_role: String, agent_id: String, error: String) -> Self {
        let mut header = EventHeader::new("agent_execution_error");
        header.agent_role = Some(agent_role);
        header.agent_id = Some(agent_id);
        header.source_type = Some("agent".to_string());
        Self { header, error }
    }
}

impl_event!(AgentExecutionErrorEvent);

/// A standalone (crew-less) agent run began.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteAgentExecutionStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// The user query the agent was kicked off with.
    pub query: String,
}

impl LiteAgentExecutionStartedEvent {
    pub fn new(agent_role: String, agent_id: String, query: String) -> Self {
        let mut header = EventHeader::new("lite_agent_execution_started");
        header.agent_role = Some(agent_role);
        header.agent_id = Some(agent_id);
        header.source_type = Some("agent".to_string());
        Self { header, query }
    }
}

impl_event!(LiteAgentExecutionStartedEvent);

/// A standalone agent run finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteAgentExecutionCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub output: String,
}

impl LiteAgentExecutionCompletedEvent {
    pub fn new(agent_role: String, agent_id: String, output: String) -> Self {
        let mut header = EventHeader::new("lite_agent_execution_completed");
        header.agent_role = Some(agent_role);
        header.agent_id = Some(agent_id);
        header.source_type = Some("agent".to_string());
        Self { header, output }
    }
}

impl_event!(LiteAgentExecutionCompletedEvent);

/// A standalone agent run errored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteAgentExecutionErrorEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub error: String,
}

impl LiteAgentExecutionErrorEvent {
    pub fn new(agent_role: String, agent_id: String, error: String) -> Self {
        let mut header = EventHeader::new("lite_agent_execution_error");
        header.agent_role = Some(agent_role);
        header.agent_id = Some(agent_id);
        header.source_type = Some("agent".to_string());
        Self { header, error }
    }
}

impl_event!(LiteAgentExecutionErrorEvent);

/// An evaluation pass over an agent's output began.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvaluationStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// Which evaluation iteration this is.
    pub iteration: u32,
}

impl AgentEvaluationStartedEvent {
    pub fn new(agent_role: String, agent_id: String, iteration: u32) -> Self {
        let mut header = EventHeader::new("agent_evaluation_started");
        header.agent_role = Some(agent_role);
        header.agent_id = Some(agent_id);
        header.source_type = Some("agent".to_string());
        Self { header, iteration }
    }
}

impl_event!(AgentEvaluationStartedEvent);

/// An evaluation pass finished with a score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvaluationCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub score: Option<f64>,
}

impl AgentEvaluationCompletedEvent {
    pub fn new(agent_role: String, agent_id: String, score: Option<f64>) -> Self {
        let mut header = EventHeader::new("agent_evaluation_completed");
        header.agent_role = Some(agent_role);
        header.agent_id = Some(agent_id);
        header.source_type = Some("agent".to_string());
        Self { header, score }
    }
}

impl_event!(AgentEvaluationCompletedEvent);

/// An evaluation pass failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvaluationFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub error: String,
}

impl AgentEvaluationFailedEvent {
    pub fn new(agent_role: String, agent_id: String, error: String) -> Self {
        let mut header = EventHeader::new("agent_evaluation_failed");
        header.agent_role = Some(agent_role);
        header.agent_id = Some(agent_id);
        header.source_type = Some("agent".to_string());
        Self { header, error }
    }
}

impl_event!(AgentEvaluationFailedEvent);
