//! Crew companion types.

pub mod crew_output;

pub use crew_output::CrewOutput;
