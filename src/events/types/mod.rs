//! The concrete event catalogue, one module per domain.
//!
//! Every event embeds an [`crate::events::base_event::EventHeader`] under a
//! `header` field (flattened in serde) and delegates the trait through
//! [`crate::impl_event!`]. Constructors fill in the source fields that make
//! sense for the domain; chain fields are left to the bus.

pub mod agent_events;
pub mod crew_events;
pub mod knowledge_events;
pub mod llm_events;
pub mod llm_guardrail_events;
pub mod logging_events;
pub mod mcp_events;
pub mod memory_events;
pub mod reasoning_events;
pub mod system_events;
pub mod task_events;
pub mod tool_events;
