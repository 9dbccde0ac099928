//! Typed event system: bus, causal context, handler graph, and the event
//! catalogue.
//!
//! Emit an event with its concrete type; handlers registered for that type
//! receive a flat [`base_event::EventHeader`] projection. The emitting
//! thread's scope stack supplies `parent_event_id` so external consumers
//! can rebuild the execution tree from the stream alone.

pub mod base_event;
pub mod bus;
pub mod context;
pub mod graph;
pub mod listener;
pub mod types;

pub use base_event::{Event, EventHeader};
pub use bus::{Depends, EventBus, HandlerId};
pub use context::{MismatchBehavior, ScopeConfig};
pub use graph::CircularDependencyError;
