//! Task lifecycle events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::base_event::EventHeader;
use crate::impl_event;

fn task_header(event_type: &str, task_id: Option<String>, task_name: Option<String>) -> EventHeader {
    let mut header = EventHeader::new(event_type);
    header.task_id = task_id;
    header.task_name = task_name;
    header.source_type = Some("task".to_string());
    header
}

/// A task started executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// Context string handed to the task, when any.
    pub context: Option<String>,
}

impl TaskStartedEvent {
    pub fn new(task_id: Option<String>, task_name: Option<String>, context: Option<String>) -> Self {
        Self {
            header: task_header("task_started", task_id, task_name),
            context,
        }
    }
}

impl_event!(TaskStartedEvent);

/// A task produced its output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// The task output, serialized.
    pub output: Value,
}

impl TaskCompletedEvent {
    pub fn new(task_id: Option<String>, task_name: Option<String>, output: Value) -> Self {
        Self {
            header: task_header("task_completed", task_id, task_name),
            output,
        }
    }
}

impl_event!(TaskCompletedEvent);

/// A task failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub error: String,
}

impl TaskFailedEvent {
    pub fn new(task_id: Option<String>, task_name: Option<String>, error: String) -> Self {
        Self {
            header: task_header("task_failed", task_id, task_name),
            error,
        }
    }
}

impl_event!(TaskFailedEvent);

/// A task output was scored. Not a scope event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvaluationEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub evaluation_type: String,
}

impl TaskEvaluationEvent {
    pub fn new(
        task_id: Option<String>,
        task_name: Option<String>,
        evaluation_type: String,
    ) -> Self {
        Self {
            header: task_header("task_evaluation", task_id, task_name),
            evaluation_type,
        }
    }
}

impl_event!(TaskEvaluationEvent);
