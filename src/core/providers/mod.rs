//! Trait-plus-global-default seams for collaborators the core only talks
//! to through an interface: human input, content processing, and
//! human-in-the-loop pause/resume.

pub mod content_processor;
pub mod hitl_provider;
pub mod human_input;

pub use content_processor::{process_content, ContentProcessorProvider};
pub use hitl_provider::{ConsoleHitlProvider, HitlProvider};
pub use human_input::{ConsoleHumanInput, HumanInputProvider};
