//! xAI / Grok provider.
//!
//! OpenAI-compatible chat completions at `https://api.x.ai/v1`, plus the
//! xAI extras: live `search` grounding and `reasoning_effort` on grok-3
//! (not the `-fast` variants). Reasoning models reject `temperature`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TroupeError;
use crate::llms::base::{AvailableFunctions, LlmMessage, LlmProvider, ProviderState};
use crate::llms::http::{client_with_timeout, send_json_with_retries, usage_map, RetryPolicy};
use crate::types::usage_metrics::UsageMetrics;

/// Default xAI endpoint.
pub const XAI_DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";
const DEFAULT_TIMEOUT_SECS: f64 = 120.0;

/// xAI Grok integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaiProvider {
    #[serde(flatten)]
    pub state: ProviderState,

    /// Request timeout in seconds.
    pub timeout: Option<f64>,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Nucleus sampling.
    pub top_p: Option<f64>,
    /// Completion token cap.
    pub max_tokens: Option<u32>,
    /// Seed for reproducible sampling.
    pub seed: Option<i64>,
    /// Structured-output configuration.
    pub response_format: Option<Value>,
    /// Thinking depth for grok-3 (`low`/`medium`/`high`).
    pub reasoning_effort: Option<String>,
    /// Live web-search grounding.
    pub search: Option<bool>,
}

impl XaiProvider {
    /// New provider for `model`. The key falls back to `XAI_API_KEY`, the
    /// base URL to `XAI_BASE_URL`.
    pub fn new(model: impl Into<String>, api_key: Option<String>, base_url: Option<String>) -> Self {
        let mut state = ProviderState::new(model, "xai");
        state.api_key = api_key.or_else(|| std::env::var("XAI_API_KEY").ok());
        state.base_url = base_url.or_else(|| std::env::var("XAI_BASE_URL").ok());
        Self {
            state,
            timeout: None,
            max_retries: RetryPolicy::default().max_retries,
            top_p: None,
            max_tokens: None,
            seed: None,
            response_format: None,
            reasoning_effort: None,
            search: None,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.state
                .base_url
                .clone()
                .unwrap_or_else(|| XAI_DEFAULT_BASE_URL.to_string())
        )
    }

    /// Whether this model takes `reasoning_effort` (and rejects
    /// `temperature`).
    pub fn is_reasoning_model(&self) -> bool {
        let model = self.state.model.to_lowercase();
        model.contains("grok-3") && !model.contains("fast")
    }

    /// Assemble the body: OpenAI shape plus the xAI extensions.
    pub fn build_request_body(&self, messages: &[LlmMessage], tools: Option<&[Value]>) -> Value {
        let mut body = serde_json::json!({
            "model": self.state.model,
            "messages": messages,
        });
        if let Some(temp) = self.state.temperature {
            if !self.is_reasoning_model() {
                body["temperature"] = serde_json::json!(temp);
            }
        }
        if let Some(max) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if let Some(top_p) = self.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
        if !self.state.stop.is_empty() {
            body["stop"] = serde_json::json!(self.state.stop);
        }
        if let Some(ref format) = self.response_format {
            body["response_format"] = format.clone();
        }
        if let Some(seed) = self.seed {
            body["seed"] = serde_json::json!(seed);
        }
        if let Some(ref effort) = self.reasoning_effort {
            if self.is_reasoning_model() {
                body["reasoning_effort"] = serde_json::json!(effort);
            }
        }
        if self.search == Some(true) {
            body["search"] = serde_json::json!(true);
        }
        if let Some(tools) = tools {
            if !tools.is_empty() {
                body["tools"] = serde_json::json!(tools);
                body["tool_choice"] = serde_json::json!("auto");
            }
        }
        body
    }

    fn parse_response(&self, response: &Value) -> Result<Value, TroupeError> {
        let message = response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| TroupeError::provider("no choices[0].message in xAI response"))?;

        if let Some(tool_calls) = message.get("tool_calls") {
            if tool_calls.as_array().is_some_and(|a| !a.is_empty()) {
                return Ok(message.clone());
            }
        }

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(Value::String(self.state.apply_stop_words(content)))
    }
}

#[async_trait]
impl LlmProvider for XaiProvider {
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
        "xai"
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn supports_multimodal(&self) -> bool {
        self.state.model.to_lowercase().contains("vision")
    }

    fn supports_stop_words(&self) -> bool {
        self.state.has_stop_words()
    }

    fn get_context_window_size(&self) -> usize {
        if self.state.model.to_lowercase().contains("vision") {
            32_768
        } else {
            131_072
        }
    }

    async fn acall(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<Value>>,
        _available_functions: Option<AvailableFunctions>,
    ) -> Result<Value, TroupeError> {
        let api_key = self
            .state
            .api_key
            .clone()
            .ok_or_else(|| TroupeError::config("xAI API key not set; set XAI_API_KEY"))?;

        let body = self.build_request_body(&messages, tools.as_deref());
        let endpoint = self.endpoint();
        let client = client_with_timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))?;
        let policy = RetryPolicy::with_max_retries(self.max_retries);

        let response = send_json_with_retries(&policy, "xAI API", || {
            Ok(client
                .post(&endpoint)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&body))
        })
        .await?;

        if let Some(usage) = response.get("usage") {
            self.state.record_usage(&usage_map(usage));
        }
        self.parse_response(&response)
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
    fn reasoning_models_drop_temperature_and_take_effort() {
        let mut provider = XaiProvider::new("grok-3", Some("k".into()), None);
        provider.state.temperature = Some(0.9);
        provider.reasoning_effort = Some("high".into());

        let body =
            provider.build_request_body(&ProviderState::string_to_messages("hi"), None);
        assert!(body.get("temperature").is_none());
        assert_eq!(body["reasoning_effort"], "high");
    }

    #[test]
    fn fast_variants_keep_temperature() {
        let mut provider = XaiProvider::new("grok-3-fast", Some("k".into()), None);
        provider.state.temperature = Some(0.3);
        provider.reasoning_effort = Some("high".into());

        let body =
            provider.build_request_body(&ProviderState::string_to_messages("hi"), None);
        assert_eq!(body["temperature"], 0.3);
        assert!(body.get("reasoning_effort").is_none());
    }

    #[test]
    fn search_flag_is_forwarded() {
        let mut provider = XaiProvider::new("grok-3-mini", Some("k".into()), None);
        provider.search = Some(true);
        let body =
            provider.build_request_body(&ProviderState::string_to_messages("hi"), None);
        assert_eq!(body["search"], true);
    }

    #[test]
    fn base_url_defaults_to_xai() {
        let provider = XaiProvider::new("grok-3-mini", Some("k".into()), None);
        assert_eq!(
            provider.endpoint(),
            format!("{}/chat/completions", XAI_DEFAULT_BASE_URL)
        );
    }
}
