//! Orchestration modes for a crew.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a crew walks its task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Process {
    /// Tasks run one after another; each task sees the outputs of all
    /// previous tasks as context.
    Sequential,
    /// A manager agent owns the task list and delegates each task to the
    /// worker it judges best suited.
    Hierarchical,
}

impl Default for Process {
    fn default() -> Self {
        Process::Sequential
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Process::Sequential => write!(f, "sequential"),
            Process::Hierarchical => write!(f, "hierarchical"),
        }
    }
}
