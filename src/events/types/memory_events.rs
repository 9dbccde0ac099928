//! Memory subsystem events. The storage backends themselves live outside
//! the core; these events are the contract observers rely on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::base_event::EventHeader;
use crate::impl_event;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRetrievalStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// Task the retrieval is enriching, when known.
    pub task_id: Option<String>,
}

impl MemoryRetrievalStartedEvent {
    pub fn new(task_id: Option<String>) -> Self {
        Self {
            header: EventHeader::new("memory_retrieval_started"),
            task_id,
        }
    }
}

impl_event!(MemoryRetrievalStartedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRetrievalCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub task_id: Option<String>,
    /// The assembled memory context.
    pub memory_content: String,
    pub retrieval_time_ms: f64,
}

impl MemoryRetrievalCompletedEvent {
    pub fn new(task_id: Option<String>, memory_content: String, retrieval_time_ms: f64) -> Self {
        Self {
            header: EventHeader::new("memory_retrieval_completed"),
            task_id,
            memory_content,
            retrieval_time_ms,
        }
    }
}

impl_event!(MemoryRetrievalCompletedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRetrievalFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub task_id: Option<String>,
    pub error: String,
}

impl MemoryRetrievalFailedEvent {
    pub fn new(task_id: Option<String>, error: String) -> Self {
        Self {
            header: EventHeader::new("memory_retrieval_failed"),
            task_id,
            error,
        }
    }
}

impl_event!(MemoryRetrievalFailedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySaveStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// What is being saved, truncated by the emitter when large.
    pub value: Option<String>,
    pub metadata: Option<Value>,
}

impl MemorySaveStartedEvent {
    pub fn new(value: Option<String>, metadata: Option<Value>) -> Self {
        Self {
            header: EventHeader::new("memory_save_started"),
            value,
            metadata,
        }
    }
}

impl_event!(MemorySaveStartedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySaveCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub value: Option<String>,
    pub save_time_ms: f64,
}

impl MemorySaveCompletedEvent {
    pub fn new(value: Option<String>, save_time_ms: f64) -> Self {
        Self {
            header: EventHeader::new("memory_save_completed"),
            value,
            save_time_ms,
        }
    }
}

impl_event!(MemorySaveCompletedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySaveFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub error: String,
}

impl MemorySaveFailedEvent {
    pub fn new(error: String) -> Self {
        Self {
            header: EventHeader::new("memory_save_failed"),
            error,
        }
    }
}

impl_event!(MemorySaveFailedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQueryStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub query: String,
    pub limit: Option<usize>,
}

impl MemoryQueryStartedEvent {
    pub fn new(query: String, limit: Option<usize>) -> Self {
        Self {
            header: EventHeader::new("memory_query_started"),
            query,
            limit,
        }
    }
}

impl_event!(MemoryQueryStartedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQueryCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub query: String,
    pub result_count: usize,
    pub query_time_ms: f64,
}

impl MemoryQueryCompletedEvent {
    pub fn new(query: String, result_count: usize, query_time_ms: f64) -> Self {
        Self {
            header: EventHeader::new("memory_query_completed"),
            query,
            result_count,
            query_time_ms,
        }
    }
}

impl_event!(MemoryQueryCompletedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQueryFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub query: String,
    pub error: String,
}

impl MemoryQueryFailedEvent {
    pub fn new(query: String, error: String) -> Self {
        Self {
            header: EventHeader::new("memory_query_failed"),
            query,
            error,
        }
    }
}

impl_event!(MemoryQueryFailedEvent);
