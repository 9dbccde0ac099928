//! Crate-wide error types.
//!
//! One enum covers the error kinds that cross module boundaries. Providers
//! distinguish transient from permanent failures internally (see
//! [`crate::llms::http`]); by the time an error reaches a caller it has
//! already been through the retry policy and is final.

use thiserror::Error;

/// Errors surfaced by the orchestration runtime.
#[derive(Debug, Error)]
pub enum TroupeError {
    /// Invalid or missing configuration: empty model names, missing API
    /// keys, non-positive timeouts, unknown memory-reset kinds.
    #[error("configuration error: {0}")]
    Config(String),

    /// A provider call failed after exhausting its retry budget, or failed
    /// with a non-retryable status.
    #[error("provider error: {0}")]
    Provider(String),

    /// The agent loop could not produce a final answer.
    #[error("agent execution error: {0}")]
    AgentExecution(String),

    /// A guardrail kept rejecting the final answer past its retry budget.
    #[error("guardrail rejected output: {0}")]
    Guardrail(String),

    /// A tool invocation failed.
    #[error("tool '{name}' failed: {message}")]
    Tool {
        /// Name of the tool that failed.
        name: String,
        /// Failure description.
        message: String,
    },

    /// `max_execution_time` elapsed before the loop finished.
    #[error("execution timed out after {0} seconds")]
    Timeout(i64),

    /// The handler graph for an event type contains a cycle.
    #[error(transparent)]
    CircularDependency(#[from] crate::events::graph::CircularDependencyError),

    /// Task-level failure (no agent assigned, output file unwritable, ...).
    #[error("task error: {0}")]
    Task(String),
}

impl TroupeError {
    /// Shorthand for a [`TroupeError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Shorthand for a [`TroupeError::Provider`].
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }
}
