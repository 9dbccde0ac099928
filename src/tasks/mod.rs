//! Task companion types: outputs, output formats, guardrails.

pub mod guardrail;
pub mod output_format;
pub mod task_output;

pub use guardrail::{Guardrail, GuardrailVerdict, LlmGuardrail};
pub use output_format::OutputFormat;
pub use task_output::TaskOutput;
