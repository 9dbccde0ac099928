//! Scripted provider for tests.
//!
//! Returns a fixed sequence of canonical responses, cycling when the
//! script runs out. Each successful call also records synthetic usage so
//! aggregation paths can be exercised without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::TroupeError;
use crate::llms::base::{AvailableFunctions, LlmMessage, LlmProvider, ProviderState};
use crate::types::usage_metrics::UsageMetrics;

/// A provider that replays a script instead of calling anyone.
#[derive(Debug)]
pub struct MockProvider {
    state: ProviderState,
    responses: Vec<Value>,
    cursor: AtomicUsize,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Script of plain-text responses.
    pub fn new(responses: Vec<&str>) -> Self {
        Self::with_values(
            responses
                .into_iter()
                .map(|s| Value::String(s.to_string()))
                .collect(),
        )
    }

    /// Script of arbitrary canonical values (text strings or assistant
    /// messages with `tool_calls`).
    pub fn with_values(responses: Vec<Value>) -> Self {
        Self {
            state: ProviderState::new("mock-model", "mock"),
            responses,
            cursor: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Convenience: a canonical assistant message requesting one tool.
    pub fn tool_call_response(id: &str, name: &str, arguments: Value) -> Value {
        serde_json::json!({
            "role": "assistant",
            "content": Value::Null,
            "tool_calls": [{
                "id": id,
                "type": "function",
                "function": {
                    "name": name,
                    "arguments": serde_json::to_string(&arguments).unwrap_or_default(),
                }
            }]
        })
    }

    /// How many calls this provider has served.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn model(&self) -> &str {
        &self.state.model
    }

    fn temperature(&self) -> Option<f64> {
        self.state.temperature
    }

    fn stop(&self) -> &[String] {
        &self.state.stop
    }

    fn set_stop(&mut self, stop: Vec<String>) {
        self.state.stop = stop;
    }

    fn provider(&self) -> &str {
        "mock"
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn call(
        &self,
        messages: Vec<LlmMessage>,
        _tools: Option<Vec<Value>>,
        _available_functions: Option<AvailableFunctions>,
    ) -> Result<Value, TroupeError> {
        // No async work to do; skip the runtime entirely so the mock can
        // run inside one.
        let _ = messages;
        if self.responses.is_empty() {
            return Err(TroupeError::provider("mock provider has no scripted responses"));
        }
        let index = self.cursor.fetch_add(1, Ordering::SeqCst) % self.responses.len();
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut usage = HashMap::new();
        usage.insert("prompt_tokens".to_string(), serde_json::json!(10));
        usage.insert("completion_tokens".to_string(), serde_json::json!(5));
        self.state.record_usage(&usage);

        let response = self.responses[index].clone();
        if let Value::String(text) = &response {
            return Ok(Value::String(self.state.apply_stop_words(text)));
        }
        Ok(response)
    }

    async fn acall(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<Value>>,
        available_functions: Option<AvailableFunctions>,
    ) -> Result<Value, TroupeError> {
        self.call(messages, tools, available_functions)
    }

    fn get_token_usage_summary(&self) -> UsageMetrics {
        self.state.usage_summary()
    }

    fn track_token_usage(&self, usage_data: &HashMap<String, Value>) {
        self.state.record_usage(usage_data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_cycle_in_order() {
        let provider = MockProvider::new(vec!["first", "second"]);
        let call = |p: &MockProvider| {
            p.call(ProviderState::string_to_messages("q"), None, None)
                .unwrap()
        };
        assert_eq!(call(&provider), Value::String("first".into()));
        assert_eq!(call(&provider), Value::String("second".into()));
        assert_eq!(call(&provider), Value::String("first".into()));
        assert_eq!(provider.call_count(), 3);
    }

    #[test]
    fn usage_accumulates_per_call() {
        let provider = MockProvider::new(vec!["only"]);
        provider
            .call(ProviderState::string_to_messages("q"), None, None)
            .unwrap();
        provider
            .call(ProviderState::string_to_messages("q"), None, None)
            .unwrap();
        let usage = provider.get_token_usage_summary();
        assert_eq!(usage.successful_requests, 2);
        assert_eq!(usage.total_tokens, 30);
    }
}
