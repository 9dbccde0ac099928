//! # troupe
//!
//! A multi-agent orchestration runtime. A [`Crew`] drives an ordered set of
//! [`Task`]s through persona-bound [`Agent`]s, each backed by a native LLM
//! provider integration (OpenAI, Anthropic, Gemini, Bedrock, Azure, xAI).
//! Every lifecycle transition is mirrored onto a process-wide event bus that
//! reconstructs the causal tree of an execution.
//!
//! The crate is organised bottom-up:
//!
//! - [`security`] / [`types`] — identity stamps and usage counters.
//! - [`events`] — typed publish/subscribe with scope tracking and
//!   dependency-ordered handler dispatch.
//! - [`llm`] / [`llms`] — the provider-agnostic call contract and the
//!   per-provider HTTP integrations.
//! - [`agents`] / [`agent`] — the ReAct / native-tool execution loop.
//! - [`task`] / [`tasks`] — units of work and their outputs.
//! - [`crew`] / [`crews`] — the sequencer tying it all together.

pub mod agent;
pub mod agents;
pub mod core;
pub mod crew;
pub mod crews;
pub mod errors;
pub mod events;
pub mod llm;
pub mod llms;
pub mod process;
pub mod security;
pub mod server;
pub mod task;
pub mod tasks;
pub mod tools;
pub mod types;
pub mod utilities;

pub use agent::Agent;
pub use crew::Crew;
pub use crews::crew_output::CrewOutput;
pub use errors::TroupeError;
pub use llm::Llm;
pub use llms::base::LlmProvider;
pub use process::Process;
pub use task::Task;
pub use tasks::guardrail::LlmGuardrail;
pub use tasks::task_output::TaskOutput;

/// Library version string reported by the HTTP server.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
