//! Knowledge retrieval events. Like memory, the retrieval backends are
//! collaborators; only the event contract lives here.

use serde::{Deserialize, Serialize};

use crate::events::base_event::EventHeader;
use crate::impl_event;

/// An agent started deriving a knowledge search query from its task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeQueryStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub task_prompt: String,
}

impl KnowledgeQueryStartedEvent {
    pub fn new(task_prompt: String) -> Self {
        Self {
            header: EventHeader::new("knowledge_query_started"),
            task_prompt,
        }
    }
}

impl_event!(KnowledgeQueryStartedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeQueryCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// The derived search query.
    pub query: String,
}

impl KnowledgeQueryCompletedEvent {
    pub fn new(query: String) -> Self {
        Self {
            header: EventHeader::new("knowledge_query_completed"),
            query,
        }
    }
}

impl_event!(KnowledgeQueryCompletedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeQueryFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub error: String,
}

impl KnowledgeQueryFailedEvent {
    pub fn new(error: String) -> Self {
        Self {
            header: EventHeader::new("knowledge_query_failed"),
            error,
        }
    }
}

impl_event!(KnowledgeQueryFailedEvent);

/// A search against the knowledge store began.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSearchQueryStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub query: String,
}

impl KnowledgeSearchQueryStartedEvent {
    pub fn new(query: String) -> Self {
        Self {
            header: EventHeader::new("knowledge_search_query_started"),
            query,
        }
    }
}

impl_event!(KnowledgeSearchQueryStartedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSearchQueryCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub query: String,
    pub result_count: usize,
}

impl KnowledgeSearchQueryCompletedEvent {
    pub fn new(query: String, result_count: usize) -> Self {
        Self {
            header: EventHeader::new("knowledge_search_query_completed"),
            query,
            result_count,
        }
    }
}

impl_event!(KnowledgeSearchQueryCompletedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSearchQueryFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub query: String,
    pub error: String,
}

impl KnowledgeSearchQueryFailedEvent {
    pub fn new(query: String, error: String) -> Self {
        Self {
            header: EventHeader::new("knowledge_search_query_failed"),
            query,
            error,
        }
    }
}

impl_event!(KnowledgeSearchQueryFailedEvent);
