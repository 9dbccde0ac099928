//! The event contract: the `Event` trait, the shared header every event
//! embeds, and the per-thread emission counter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Emission sequence (per thread)
// ---------------------------------------------------------------------------

thread_local! {
    static EMISSION_SEQUENCE: Cell<u64> = const { Cell::new(1) };
}

/// Take the next emission sequence number for the calling thread.
pub fn next_emission_sequence() -> u64 {
    EMISSION_SEQUENCE.with(|c| {
        let n = c.get();
        c.set(n + 1);
        n
    })
}

/// Reset the calling thread's emission counter back to 1. Test hook.
pub fn reset_emission_sequence() {
    EMISSION_SEQUENCE.with(|c| c.set(1));
}

// ---------------------------------------------------------------------------
// Event trait
// ---------------------------------------------------------------------------

/// Implemented by every event the bus can carry.
///
/// Events are identified by a fresh UUID, stamped with a UTC timestamp and
/// a `type` discriminator string, and chained to one another through the
/// parent / previous / triggered-by fields the bus fills in at emission
/// time. Source fields tie an event back to the agent, task, or crew that
/// produced it.
pub trait Event: Send + Sync + std::fmt::Debug {
    /// Unique id of this event instance.
    fn event_id(&self) -> &str;

    /// UTC creation time.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Discriminator string, e.g. `"task_started"`.
    fn event_type(&self) -> &str;

    /// Fingerprint UUID of the emitting entity, when known.
    fn source_fingerprint(&self) -> Option<&str>;

    /// Kind of the emitting entity: `"agent"`, `"task"`, or `"crew"`.
    fn source_type(&self) -> Option<&str>;

    /// Metadata carried by the source fingerprint.
    fn fingerprint_metadata(&self) -> Option<&HashMap<String, serde_json::Value>>;

    /// Task id, when the event belongs to a task.
    fn task_id(&self) -> Option<&str>;

    /// Task name, when the event belongs to a task.
    fn task_name(&self) -> Option<&str>;

    /// Agent id, when the event belongs to an agent.
    fn agent_id(&self) -> Option<&str>;

    /// Agent role, when the event belongs to an agent.
    fn agent_role(&self) -> Option<&str>;

    /// Scope parent, assigned by the bus.
    fn parent_event_id(&self) -> Option<&str>;
    /// Set the scope parent.
    fn set_parent_event_id(&mut self, id: Option<String>);

    /// Previous event on the same thread, assigned by the bus.
    fn previous_event_id(&self) -> Option<&str>;
    /// Set the previous-event link.
    fn set_previous_event_id(&mut self, id: Option<String>);

    /// Causal trigger, assigned by the bus from the triggered-by scope.
    fn triggered_by_event_id(&self) -> Option<&str>;
    /// Set the causal trigger.
    fn set_triggered_by_event_id(&mut self, id: Option<String>);

    /// Per-thread monotone emission number, assigned by the bus.
    fn emission_sequence(&self) -> Option<u64>;
    /// Set the emission number.
    fn set_emission_sequence(&mut self, seq: Option<u64>);
}

// ---------------------------------------------------------------------------
// EventHeader
// ---------------------------------------------------------------------------

/// The shared header every concrete event embeds, and the flat projection
/// handlers receive. Serializes with the discriminator under `"type"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHeader {
    /// Unique id (UUID v4) of this event instance.
    pub event_id: String,
    /// UTC creation time.
    pub timestamp: DateTime<Utc>,
    /// Discriminator string.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Fingerprint UUID of the emitting entity.
    pub source_fingerprint: Option<String>,
    /// Kind of the emitting entity (`agent` / `task` / `crew`).
    pub source_type: Option<String>,
    /// Metadata of the source fingerprint.
    pub fingerprint_metadata: Option<HashMap<String, serde_json::Value>>,
    /// Associated task id.
    pub task_id: Option<String>,
    /// Associated task name.
    pub task_name: Option<String>,
    /// Associated agent id.
    pub agent_id: Option<String>,
    /// Associated agent role.
    pub agent_role: Option<String>,
    /// Scope parent (hierarchy).
    pub parent_event_id: Option<String>,
    /// Previous event on the emitting thread (linear chain).
    pub previous_event_id: Option<String>,
    /// Causal trigger.
    pub triggered_by_event_id: Option<String>,
    /// Per-thread emission number.
    pub emission_sequence: Option<u64>,
}

impl EventHeader {
    /// Fresh header for the given event type: new UUID, current time, all
    /// chain fields unset.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.into(),
            source_fingerprint: None,
            source_type: None,
            fingerprint_metadata: None,
            task_id: None,
            task_name: None,
            agent_id: None,
            agent_role: None,
            parent_event_id: None,
            previous_event_id: None,
            triggered_by_event_id: None,
            emission_sequence: None,
        }
    }

    /// Copy the header fields out of any event. This is the projection the
    /// bus hands to handlers so payloads can cross threads freely.
    pub fn project(event: &dyn Event) -> Self {
        Self {
            event_id: event.event_id().to_string(),
            timestamp: event.timestamp(),
            event_type: event.event_type().to_string(),
            source_fingerprint: event.source_fingerprint().map(str::to_string),
            source_type: event.source_type().map(str::to_string),
            fingerprint_metadata: event.fingerprint_metadata().cloned(),
            task_id: event.task_id().map(str::to_string),
            task_name: event.task_name().map(str::to_string),
            agent_id: event.agent_id().map(str::to_string),
            agent_role: event.agent_role().map(str::to_string),
            parent_event_id: event.parent_event_id().map(str::to_string),
            previous_event_id: event.previous_event_id().map(str::to_string),
            triggered_by_event_id: event.triggered_by_event_id().map(str::to_string),
            emission_sequence: event.emission_sequence(),
        }
    }
}

impl Event for EventHeader {
    fn event_id(&self) -> &str {
        &self.event_id
    }
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    fn event_type(&self) -> &str {
        &self.event_type
    }
    fn source_fingerprint(&self) -> Option<&str> {
        self.source_fingerprint.as_deref()
    }
    fn source_type(&self) -> Option<&str> {
        self.source_type.as_deref()
    }
    fn fingerprint_metadata(&self) -> Option<&HashMap<String, serde_json::Value>> {
        self.fingerprint_metadata.as_ref()
    }
    fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }
    fn task_name(&self) -> Option<&str> {
        self.task_name.as_deref()
    }
    fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }
    fn agent_role(&self) -> Option<&str> {
        self.agent_role.as_deref()
    }
    fn parent_event_id(&self) -> Option<&str> {
        self.parent_event_id.as_deref()
    }
    fn set_parent_event_id(&mut self, id: Option<String>) {
        self.parent_event_id = id;
    }
    fn previous_event_id(&self) -> Option<&str> {
        self.previous_event_id.as_deref()
    }
    fn set_previous_event_id(&mut self, id: Option<String>) {
        self.previous_event_id = id;
    }
    fn triggered_by_event_id(&self) -> Option<&str> {
        self.triggered_by_event_id.as_deref()
    }
    fn set_triggered_by_event_id(&mut self, id: Option<String>) {
        self.triggered_by_event_id = id;
    }
    fn emission_sequence(&self) -> Option<u64> {
        self.emission_sequence
    }
    fn set_emission_sequence(&mut self, seq: Option<u64>) {
        self.emission_sequence = seq;
    }
}

/// Implement [`Event`] for a struct carrying a `header: EventHeader` field.
///
/// ```ignore
/// impl_event!(TaskStartedEvent);
/// ```
#[macro_export]
macro_rules! impl_event {
    ($ty:ty) => {
        impl $crate::events::base_event::Event for $ty {
            fn event_id(&self) -> &str {
                &self.header.event_id
            }
            fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
                self.header.timestamp
            }
            fn event_type(&self) -> &str {
                &self.header.event_type
            }
            fn source_fingerprint(&self) -> Option<&str> {
                self.header.source_fingerprint.as_deref()
            }
            fn source_type(&self) -> Option<&str> {
                self.header.source_type.as_deref()
            }
            fn fingerprint_metadata(
                &self,
            ) -> Option<&std::collections::HashMap<String, serde_json::Value>> {
                self.header.fingerprint_metadata.as_ref()
            }
            fn task_id(&self) -> Option<&str> {
                self.header.task_id.as_deref()
            }
            fn task_name(&self) -> Option<&str> {
                self.header.task_name.as_deref()
            }
            fn agent_id(&self) -> Option<&str> {
                self.header.agent_id.as_deref()
            }
            fn agent_role(&self) -> Option<&str> {
                self.header.agent_role.as_deref()
            }
            fn parent_event_id(&self) -> Option<&str> {
                self.header.parent_event_id.as_deref()
            }
            fn set_parent_event_id(&mut self, id: Option<String>) {
                self.header.parent_event_id = id;
            }
            fn previous_event_id(&self) -> Option<&str> {
                self.header.previous_event_id.as_deref()
            }
            fn set_previous_event_id(&mut self, id: Option<String>) {
                self.header.previous_event_id = id;
            }
            fn triggered_by_event_id(&self) -> Option<&str> {
                self.header.triggered_by_event_id.as_deref()
            }
            fn set_triggered_by_event_id(&mut self, id: Option<String>) {
                self.header.triggered_by_event_id = id;
            }
            fn emission_sequence(&self) -> Option<u64> {
                self.header.emission_sequence
            }
            fn set_emission_sequence(&mut self, seq: Option<u64>) {
                self.header.emission_sequence = seq;
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emission_sequence_is_monotone_per_thread() {
        reset_emission_sequence();
        let a = next_emission_sequence();
        let b = next_emission_sequence();
        let c = next_emission_sequence();
        assert!(a < b && b < c);
    }

    #[test]
    fn header_serializes_discriminator_under_type_key() {
        let header = EventHeader::new("task_started");
        let json = serde_json::to_value(&header).unwrap();
        assert_eq!(json["type"], "task_started");
        assert!(json.get("event_id").is_some());
    }

    #[test]
    fn projection_preserves_chain_fields() {
        let mut header = EventHeader::new("llm_call_started");
        header.set_parent_event_id(Some("parent".into()));
        header.set_previous_event_id(Some("prev".into()));
        header.set_emission_sequence(Some(7));

        let projected = EventHeader::project(&header);
        assert_eq!(projected.parent_event_id.as_deref(), Some("parent"));
        assert_eq!(projected.previous_event_id.as_deref(), Some("prev"));
        assert_eq!(projected.emission_sequence, Some(7));
        assert_eq!(projected.event_type, "llm_call_started");
    }
}
