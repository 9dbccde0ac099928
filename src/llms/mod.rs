//! Provider-level LLM abstraction: the [`base::LlmProvider`] trait, shared
//! HTTP plumbing, streaming support, and the native provider integrations.

pub mod base;
pub mod http;
pub mod providers;
pub mod streaming;
