//! Crew lifecycle events: kickoff, training, and test runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::events::base_event::EventHeader;
use crate::impl_event;

// The crew name travels in the payload; the header only records the kind.
fn crew_header(event_type: &str) -> EventHeader {
    let mut header = EventHeader::new(event_type);
    header.source_type = Some("crew".to_string());
    header
}

/// A crew kickoff began. Brackets the whole run together with its
/// completed/failed closer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewKickoffStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub crew_name: Option<String>,
    /// The interpolation inputs the crew was started with.
    pub inputs: Option<HashMap<String, String>>,
}

impl CrewKickoffStartedEvent {
    pub fn new(crew_name: Option<String>, inputs: Option<HashMap<String, String>>) -> Self {
        Self {
            header: crew_header("crew_kickoff_started"),
            crew_name,
            inputs,
        }
    }
}

impl_event!(CrewKickoffStartedEvent);

/// A crew kickoff produced its final output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewKickoffCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub crew_name: Option<String>,
    /// The crew's final output, serialized.
    pub output: Value,
}

impl CrewKickoffCompletedEvent {
    pub fn new(crew_name: Option<String>, output: Value) -> Self {
        Self {
            header: crew_header("crew_kickoff_completed"),
            crew_name,
            output,
        }
    }
}

impl_event!(CrewKickoffCompletedEvent);

/// A crew kickoff aborted with an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewKickoffFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub crew_name: Option<String>,
    pub error: String,
}

impl CrewKickoffFailedEvent {
    pub fn new(crew_name: Option<String>, error: String) -> Self {
        Self {
            header: crew_header("crew_kickoff_failed"),
            crew_name,
            error,
        }
    }
}

impl_event!(CrewKickoffFailedEvent);

/// A training run over the crew began.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewTrainStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub crew_name: Option<String>,
    pub n_iterations: u32,
}

impl CrewTrainStartedEvent {
    pub fn new(crew_name: Option<String>, n_iterations: u32) -> Self {
        Self {
            header: crew_header("crew_train_started"),
            crew_name,
            n_iterations,
        }
    }
}

impl_event!(CrewTrainStartedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewTrainCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub crew_name: Option<String>,
}

impl CrewTrainCompletedEvent {
    pub fn new(crew_name: Option<String>) -> Self {
        Self {
            header: crew_header("crew_train_completed"),
            crew_name,
        }
    }
}

impl_event!(CrewTrainCompletedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewTrainFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub crew_name: Option<String>,
    pub error: String,
}

impl CrewTrainFailedEvent {
    pub fn new(crew_name: Option<String>, error: String) -> Self {
        Self {
            header: crew_header("crew_train_failed"),
            crew_name,
            error,
        }
    }
}

impl_event!(CrewTrainFailedEvent);

/// A test (evaluation) run over the crew began.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewTestStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub crew_name: Option<String>,
    pub n_iterations: u32,
    /// Model used to grade the outputs.
    pub eval_llm: Option<String>,
}

impl CrewTestStartedEvent {
    pub fn new(crew_name: Option<String>, n_iterations: u32, eval_llm: Option<String>) -> Self {
        Self {
            header: crew_header("crew_test_started"),
            crew_name,
            n_iterations,
            eval_llm,
        }
    }
}

impl_event!(CrewTestStartedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewTestCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub crew_name: Option<String>,
}

impl CrewTestCompletedEvent {
    pub fn new(crew_name: Option<String>) -> Self {
        Self {
            header: crew_header("crew_test_completed"),
            crew_name,
        }
    }
}

impl_event!(CrewTestCompletedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewTestFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub crew_name: Option<String>,
    pub error: String,
}

impl CrewTestFailedEvent {
    pub fn new(crew_name: Option<String>, error: String) -> Self {
        Self {
            header: crew_header("crew_test_failed"),
            crew_name,
            error,
        }
    }
}

impl_event!(CrewTestFailedEvent);

/// One graded result out of a crew test run. Not a scope event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewTestResultEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub crew_name: Option<String>,
    pub quality: f64,
    pub execution_duration: f64,
    pub model: Option<String>,
}

impl CrewTestResultEvent {
    pub fn new(
        crew_name: Option<String>,
        quality: f64,
        execution_duration: f64,
        model: Option<String>,
    ) -> Self {
        Self {
            header: crew_header("crew_test_result"),
            crew_name,
            quality,
            execution_duration,
            model,
        }
    }
}

impl_event!(CrewTestResultEvent);
