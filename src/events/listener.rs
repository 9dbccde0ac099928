//! Listener base: a bundle of handler registrations set up as a unit.

use super::bus::{EventBus, HandlerId};

/// A listener groups related handler registrations so they can be installed
/// and torn down together (console printers, trace exporters, test probes).
pub trait BaseEventListener: Send + Sync {
    /// Register this listener's handlers on the bus, returning the ids so
    /// the caller can unregister them later.
    fn setup_listeners(&mut self, bus: &'static EventBus) -> Vec<HandlerId>;
}
