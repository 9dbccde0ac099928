//! Process signal events, emitted by the server binary's signal handler so
//! listeners can flush before shutdown.

use serde::{Deserialize, Serialize};

use crate::events::base_event::EventHeader;
use crate::impl_event;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigTermEvent {
    #[serde(flatten)]
    pub header: EventHeader,
}

impl SigTermEvent {
    pub fn new() -> Self {
        Self {
            header: EventHeader::new("SIGTERM"),
        }
    }
}

impl Default for SigTermEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl_event!(SigTermEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigIntEvent {
    #[serde(flatten)]
    pub header: EventHeader,
}

impl SigIntEvent {
    pub fn new() -> Self {
        Self {
            header: EventHeader::new("SIGINT"),
        }
    }
}

impl Default for SigIntEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl_event!(SigIntEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigHupEvent {
    #[serde(flatten)]
    pub header: EventHeader,
}

impl SigHupEvent {
    pub fn new() -> Self {
        Self {
            header: EventHeader::new("SIGHUP"),
        }
    }
}

impl Default for SigHupEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl_event!(SigHupEvent);
