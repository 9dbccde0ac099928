//! The uniform provider contract and the state shared by every native
//! provider implementation.
//!
//! A provider takes canonical chat messages and returns either a plain
//! text `Value::String` (after stop-word truncation) or an assistant
//! message object carrying canonical `tool_calls`. Everything downstream —
//! the agent loop, the crew — consumes only that shape.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::TroupeError;
use crate::types::usage_metrics::UsageMetrics;

/// Context window assumed when nothing better is known.
pub const DEFAULT_CONTEXT_WINDOW: usize = 4096;

/// A single chat message: `role`, `content`, and optionally `tool_calls`,
/// `tool_call_id`, or `name`. Kept as a loose map because providers attach
/// different optional keys.
pub type LlmMessage = HashMap<String, Value>;

/// Functions the caller is willing to let the model invoke, keyed by name.
/// Opaque at this layer; the agent loop does the dispatching.
pub type AvailableFunctions = HashMap<String, Box<dyn Any + Send + Sync>>;

/// Mint a correlation id for one logical LLM call.
pub fn new_call_id() -> String {
    Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// LlmProvider trait
// ---------------------------------------------------------------------------

/// Implemented by every native provider integration.
///
/// Implementations are cheap to construct and stateless per call apart
/// from the token counter, which uses locked adds so `&self` methods can
/// record usage.
#[async_trait]
pub trait LlmProvider: Send + Sync + fmt::Debug {
    /// Model identifier.
    fn model(&self) -> &str;

    /// Configured sampling temperature, if any.
    fn temperature(&self) -> Option<f64>;

    /// Stop sequences applied to text responses.
    fn stop(&self) -> &[String];

    /// Replace the stop sequences.
    fn set_stop(&mut self, stop: Vec<String>);

    /// Provider name (`"openai"`, `"anthropic"`, ...).
    fn provider(&self) -> &str {
        "openai"
    }

    /// Synchronous call. Default wraps [`acall`](Self::acall) on a fresh
    /// runtime, which is how the crew's synchronous surface reaches the
    /// async HTTP stack.
    fn call(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<Value>>,
        available_functions: Option<AvailableFunctions>,
    ) -> Result<Value, TroupeError> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| TroupeError::provider(format!("failed to start runtime: {e}")))?;
        runtime.block_on(self.acall(messages, tools, available_functions))
    }

    /// Asynchronous call.
    async fn acall(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<Value>>,
        available_functions: Option<AvailableFunctions>,
    ) -> Result<Value, TroupeError>;

    /// Whether the model accepts native tool definitions.
    fn supports_function_calling(&self) -> bool {
        false
    }

    /// Whether stop sequences will be applied to responses.
    fn supports_stop_words(&self) -> bool {
        true
    }

    /// Whether the model accepts image content blocks.
    fn supports_multimodal(&self) -> bool {
        false
    }

    /// Model context window in tokens.
    fn get_context_window_size(&self) -> usize {
        DEFAULT_CONTEXT_WINDOW
    }

    /// Cumulative usage recorded by this instance.
    fn get_token_usage_summary(&self) -> UsageMetrics;

    /// Record usage figures from a provider response.
    fn track_token_usage(&self, usage_data: &HashMap<String, Value>);

    /// Reshape tools into the provider's native format. Default passes
    /// them through untouched (OpenAI-shaped tools).
    fn convert_tools_for_inference(&self, tools: Vec<Value>) -> Vec<Value> {
        tools
    }
}

// ---------------------------------------------------------------------------
// ProviderState
// ---------------------------------------------------------------------------

/// Raw token counters behind the provider's usage lock.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TokenTally {
    pub total_tokens: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub cached_prompt_tokens: i64,
    pub successful_requests: i64,
}

/// Configuration and bookkeeping every provider embeds.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderState {
    /// Model identifier. Never empty.
    pub model: String,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// API key; resolution order is constructor argument then env var.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL override.
    pub base_url: Option<String>,
    /// Stop sequences.
    pub stop: Vec<String>,
    /// Provider name.
    pub provider: String,
    /// Extra provider-specific parameters, passed through opaquely.
    pub additional_params: HashMap<String, Value>,
    /// Usage counters. Locked so `&self` call paths can add.
    #[serde(skip)]
    usage: Mutex<TokenTally>,
}

impl Clone for ProviderState {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            temperature: self.temperature,
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            stop: self.stop.clone(),
            provider: self.provider.clone(),
            additional_params: self.additional_params.clone(),
            usage: Mutex::new(self.usage.lock().clone()),
        }
    }
}

impl ProviderState {
    /// New state for `model` under `provider`.
    ///
    /// # Panics
    ///
    /// Panics when `model` is empty; there is no meaningful recovery and
    /// every constructor goes through here.
    pub fn new(model: impl Into<String>, provider: impl Into<String>) -> Self {
        let model = model.into();
        assert!(!model.is_empty(), "model name is required and cannot be empty");
        Self {
            model,
            temperature: None,
            api_key: None,
            base_url: None,
            stop: Vec::new(),
            provider: provider.into(),
            additional_params: HashMap::new(),
            usage: Mutex::new(TokenTally::default()),
        }
    }

    // -- stop words ---------------------------------------------------------

    /// Truncate `content` at the earliest stop sequence, excluding the stop
    /// string itself, then right-trim. Idempotent: once truncated, no stop
    /// string remains in the output.
    pub fn apply_stop_words(&self, content: &str) -> String {
        if self.stop.is_empty() || content.is_empty() {
            return content.to_string();
        }
        let mut cut = content.len();
        let mut hit: Option<&str> = None;
        for stop_word in &self.stop {
            if let Some(pos) = content.find(stop_word.as_str()) {
                if pos < cut {
                    cut = pos;
                    hit = Some(stop_word);
                }
            }
        }
        match hit {
            Some(word) => {
                log::debug!("stop word '{}' applied at byte {}", word, cut);
                content[..cut].trim_end().to_string()
            }
            None => content.to_string(),
        }
    }

    /// Whether any stop sequences are configured.
    pub fn has_stop_words(&self) -> bool {
        !self.stop.is_empty()
    }

    // -- messages -----------------------------------------------------------

    /// Validate that each message carries `role` and `content`. Identity on
    /// well-formed lists.
    pub fn format_messages(&self, messages: Vec<LlmMessage>) -> Result<Vec<LlmMessage>, TroupeError> {
        for (i, msg) in messages.iter().enumerate() {
            if !msg.contains_key("role") || !msg.contains_key("content") {
                return Err(TroupeError::config(format!(
                    "message at index {} must have 'role' and 'content' keys",
                    i
                )));
            }
        }
        Ok(messages)
    }

    /// Wrap a bare string as a single user message.
    pub fn string_to_messages(text: &str) -> Vec<LlmMessage> {
        let mut msg = HashMap::new();
        msg.insert("role".to_string(), Value::String("user".to_string()));
        msg.insert("content".to_string(), Value::String(text.to_string()));
        vec![msg]
    }

    // -- usage --------------------------------------------------------------

    /// Record one successful call's usage. Field names are normalized
    /// across providers (`prompt_tokens` / `input_tokens` /
    /// `promptTokenCount`, and so on).
    pub fn record_usage(&self, usage_data: &HashMap<String, Value>) {
        let prompt = usage_data
            .get("prompt_tokens")
            .or_else(|| usage_data.get("input_tokens"))
            .or_else(|| usage_data.get("promptTokenCount"))
            .or_else(|| usage_data.get("prompt_token_count"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let completion = usage_data
            .get("completion_tokens")
            .or_else(|| usage_data.get("output_tokens"))
            .or_else(|| usage_data.get("candidatesTokenCount"))
            .or_else(|| usage_data.get("candidates_token_count"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let cached = usage_data
            .get("cached_tokens")
            .or_else(|| usage_data.get("cached_prompt_tokens"))
            .or_else(|| usage_data.get("cachedContentTokenCount"))
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let mut tally = self.usage.lock();
        tally.prompt_tokens += prompt;
        tally.completion_tokens += completion;
        tally.total_tokens += prompt + completion;
        tally.cached_prompt_tokens += cached;
        tally.successful_requests += 1;
    }

    /// Snapshot the counters as [`UsageMetrics`].
    pub fn usage_summary(&self) -> UsageMetrics {
        let tally = self.usage.lock();
        UsageMetrics {
            total_tokens: tally.total_tokens,
            prompt_tokens: tally.prompt_tokens,
            cached_prompt_tokens: tally.cached_prompt_tokens,
            completion_tokens: tally.completion_tokens,
            successful_requests: tally.successful_requests,
        }
    }

    // -- structured output --------------------------------------------------

    /// Pull a JSON value out of a model response: direct parse when the
    /// text starts like JSON, otherwise the first braced object found.
    pub fn validate_structured_output(response: &str) -> Result<Value, TroupeError> {
        let trimmed = response.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
                return Ok(value);
            }
        }
        let braced = Regex::new(r"(?s)\{.*\}").expect("literal regex");
        if let Some(found) = braced.find(response) {
            if let Ok(value) = serde_json::from_str::<Value>(found.as_str()) {
                return Ok(value);
            }
        }
        Err(TroupeError::provider("no JSON found in response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_words_truncate_at_earliest_match() {
        let mut state = ProviderState::new("test-model", "openai");
        state.stop = vec!["Observation:".to_string(), "Final Answer:".to_string()];

        let content = "I need to look this up.\n\nAction: search\nObservation: results";
        assert_eq!(
            state.apply_stop_words(content),
            "I need to look this up.\n\nAction: search"
        );
    }

    #[test]
    fn stop_word_application_is_idempotent() {
        let mut state = ProviderState::new("test-model", "openai");
        state.stop = vec!["Observation:".to_string()];

        let once = state.apply_stop_words("thought\nObservation: foo\nObservation: bar");
        let twice = state.apply_stop_words(&once);
        assert_eq!(once, twice);

        // And on inputs with no stop word at all.
        let clean = state.apply_stop_words("plain text");
        assert_eq!(state.apply_stop_words(&clean), clean);
    }

    #[test]
    #[should_panic(expected = "model name is required")]
    fn empty_model_is_rejected() {
        ProviderState::new("", "openai");
    }

    #[test]
    fn format_messages_is_identity_on_well_formed_lists() {
        let state = ProviderState::new("m", "openai");
        let messages = ProviderState::string_to_messages("hello");
        let formatted = state.format_messages(messages.clone()).unwrap();
        assert_eq!(formatted, messages);

        let mut bad = HashMap::new();
        bad.insert("role".to_string(), Value::String("user".to_string()));
        assert!(state.format_messages(vec![bad]).is_err());
    }

    #[test]
    fn usage_normalizes_provider_field_names() {
        let state = ProviderState::new("m", "anthropic");

        let mut anthropic_style = HashMap::new();
        anthropic_style.insert("input_tokens".to_string(), serde_json::json!(100));
        anthropic_style.insert("output_tokens".to_string(), serde_json::json!(40));
        state.record_usage(&anthropic_style);

        let mut gemini_style = HashMap::new();
        gemini_style.insert("promptTokenCount".to_string(), serde_json::json!(10));
        gemini_style.insert("candidatesTokenCount".to_string(), serde_json::json!(5));
        gemini_style.insert("cachedContentTokenCount".to_string(), serde_json::json!(2));
        state.record_usage(&gemini_style);

        let summary = state.usage_summary();
        assert_eq!(summary.prompt_tokens, 110);
        assert_eq!(summary.completion_tokens, 45);
        assert_eq!(summary.total_tokens, 155);
        assert_eq!(summary.cached_prompt_tokens, 2);
        assert_eq!(summary.successful_requests, 2);
    }

    #[test]
    fn structured_output_extraction() {
        assert!(ProviderState::validate_structured_output(r#"{"k": 1}"#).is_ok());
        assert!(
            ProviderState::validate_structured_output("prefix {\"k\": 1} suffix").is_ok()
        );
        assert!(ProviderState::validate_structured_output("no json here").is_err());
    }
}
