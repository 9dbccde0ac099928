//! Process-wide collaborator seams.

pub mod providers;
