//! Anthropic messages-API provider.
//!
//! `POST {base}/v1/messages` with `x-api-key` and `anthropic-version`
//! headers. System messages are lifted out of the conversation into the
//! separate `system` parameter; assistant `tool_calls` become `tool_use`
//! content blocks and `tool` role messages become user-side `tool_result`
//! blocks. `max_tokens` is mandatory on this API.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TroupeError;
use crate::llms::base::{AvailableFunctions, LlmMessage, LlmProvider, ProviderState};
use crate::llms::http::{client_with_timeout, send_json_with_retries, RetryPolicy};
use crate::types::usage_metrics::UsageMetrics;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_TIMEOUT_SECS: f64 = 120.0;
const DEFAULT_MAX_TOKENS: u32 = 4096;
const API_VERSION: &str = "2023-06-01";

/// Anthropic messages-API integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicProvider {
    #[serde(flatten)]
    pub state: ProviderState,

    /// Request timeout in seconds.
    pub timeout: Option<f64>,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Response token cap; the API requires a value.
    pub max_tokens: u32,
    /// `anthropic-version` header value.
    pub anthropic_version: String,
    /// Nucleus sampling.
    pub top_p: Option<f64>,
}

impl AnthropicProvider {
    /// New provider for `model`. The key falls back to `ANTHROPIC_API_KEY`.
    pub fn new(model: impl Into<String>, api_key: Option<String>, base_url: Option<String>) -> Self {
        let mut state = ProviderState::new(model, "anthropic");
        state.api_key = api_key.or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
        state.base_url = base_url;
        Self {
            state,
            timeout: None,
            max_retries: RetryPolicy::default().max_retries,
            max_tokens: DEFAULT_MAX_TOKENS,
            anthropic_version: API_VERSION.to_string(),
            top_p: None,
        }
    }

    fn endpoint(&self) -> String {
        let base = self
            .state
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        format!("{}/v1/messages", base)
    }

    /// Split system messages out and reshape the rest into Anthropic's
    /// content-block form.
    fn reshape_messages(&self, messages: &[LlmMessage]) -> (Option<String>, Vec<Value>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut reshaped: Vec<Value> = Vec::new();

        for msg in messages {
            let role = msg.get("role").and_then(Value::as_str).unwrap_or("user");
            let content = msg.get("content").cloned().unwrap_or(Value::Null);

            match role {
                "system" => {
                    if let Some(text) = content.as_str() {
                        system_parts.push(text.to_string());
                    } else if let Some(blocks) = content.as_array() {
                        for block in blocks {
                            if let Some(text) = block.get("text").and_then(Value::as_str) {
                                system_parts.push(text.to_string());
                            }
                        }
                    }
                }
                "tool" => {
                    let tool_use_id = msg
                        .get("tool_call_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    reshaped.push(serde_json::json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": tool_use_id,
                            "content": content.as_str().unwrap_or_default(),
                        }]
                    }));
                }
                "assistant" if msg.get("tool_calls").is_some() => {
                    let mut blocks: Vec<Value> = Vec::new();
                    if let Some(text) = content.as_str() {
                        if !text.is_empty() {
                            blocks.push(serde_json::json!({"type": "text", "text": text}));
                        }
                    }
                    if let Some(tool_calls) = msg.get("tool_calls").and_then(Value::as_array) {
                        for tc in tool_calls {
                            let id = tc.get("id").and_then(Value::as_str).unwrap_or_default();
                            let function = tc.get("function").cloned().unwrap_or(Value::Null);
                            let name = function
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or_default();
                            let arguments = function
                                .get("arguments")
                                .and_then(Value::as_str)
                                .unwrap_or("{}");
                            let input: Value =
                                serde_json::from_str(arguments).unwrap_or_else(|_| serde_json::json!({}));
                            blocks.push(serde_json::json!({
                                "type": "tool_use",
                                "id": id,
                                "name": name,
                                "input": input,
                            }));
                        }
                    }
                    reshaped.push(serde_json::json!({"role": "assistant", "content": blocks}));
                }
                _ => {
                    reshaped.push(serde_json::json!({"role": role, "content": content}));
                }
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, reshaped)
    }

    /// Assemble the messages-API body.
    pub fn build_request_body(&self, messages: &[LlmMessage], tools: Option<&[Value]>) -> Value {
        let (system, reshaped) = self.reshape_messages(messages);

        let mut body = serde_json::json!({
            "model": self.state.model,
            "max_tokens": self.max_tokens,
            "messages": reshaped,
        });
        if let Some(system) = system {
            body["system"] = Value::String(system);
        }
        if let Some(temp) = self.state.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(top_p) = self.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
        if !self.state.stop.is_empty() {
            body["stop_sequences"] = serde_json::json!(self.state.stop);
        }
        if let Some(tools) = tools {
            if !tools.is_empty() {
                body["tools"] = serde_json::json!(self.convert_tools_for_inference(tools.to_vec()));
            }
        }
        body
    }

    /// Walk `content[]`: `text` blocks concatenate, `tool_use` blocks turn
    /// into canonical tool calls, `thinking` blocks are logged only.
    fn parse_response(&self, response: &Value) -> Result<Value, TroupeError> {
        let content = response
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| TroupeError::provider("no content array in Anthropic response"))?;

        let mut text_parts: Vec<String> = Vec::new();
        let mut tool_calls: Vec<Value> = Vec::new();

        for block in content {
            match block.get("type").and_then(Value::as_str).unwrap_or_default() {
                "text" => {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        text_parts.push(text.to_string());
                    }
                }
                "tool_use" => {
                    let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                    let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                    let input = block.get("input").cloned().unwrap_or(Value::Null);
                    let arguments = serde_json::to_string(&input).unwrap_or_default();
                    tool_calls.push(serde_json::json!({
                        "id": id,
                        "type": "function",
                        "function": {"name": name, "arguments": arguments},
                    }));
                }
                "thinking" => {
                    if let Some(thinking) = block.get("thinking").and_then(Value::as_str) {
                        let preview: String = thinking.chars().take(200).collect();
                        log::debug!("Anthropic thinking: {}...", preview);
                    }
                }
                other => log::debug!("unhandled Anthropic content block type: {}", other),
            }
        }

        if !tool_calls.is_empty() {
            let combined = text_parts.join("");
            return Ok(serde_json::json!({
                "role": "assistant",
                "content": if combined.is_empty() { Value::Null } else { Value::String(combined) },
                "tool_calls": tool_calls,
            }));
        }

        Ok(Value::String(
            self.state.apply_stop_words(&text_parts.join("")),
        ))
    }

    /// Anthropic reports `input_tokens` / `output_tokens` plus cache reads.
    fn extract_usage(response: &Value) -> HashMap<String, Value> {
        let mut usage = HashMap::new();
        if let Some(u) = response.get("usage") {
            for key in ["input_tokens", "output_tokens", "cache_read_input_tokens"] {
                if let Some(v) = u.get(key).and_then(Value::as_i64) {
                    let normalized = if key == "cache_read_input_tokens" {
                        "cached_tokens"
                    } else {
                        key
                    };
                    usage.insert(normalized.to_string(), serde_json::json!(v));
                }
            }
        }
        usage
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
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
        "anthropic"
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn supports_multimodal(&self) -> bool {
        true
    }

    fn supports_stop_words(&self) -> bool {
        self.state.has_stop_words()
    }

    fn get_context_window_size(&self) -> usize {
        200_000
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
            .ok_or_else(|| {
                TroupeError::config(
                    "Anthropic API key not set; set ANTHROPIC_API_KEY or pass api_key",
                )
            })?;

        let body = self.build_request_body(&messages, tools.as_deref());
        let endpoint = self.endpoint();
        let client = client_with_timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))?;
        let policy = RetryPolicy::with_max_retries(self.max_retries);

        let response = send_json_with_retries(&policy, "Anthropic API", || {
            Ok(client
                .post(&endpoint)
                .header("content-type", "application/json")
                .header("x-api-key", api_key.as_str())
                .header("anthropic-version", &self.anthropic_version)
                .json(&body))
        })
        .await?;

        // The body can carry an error object even on a 200.
        if response.get("type").and_then(Value::as_str) == Some("error") {
            let message = response
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown Anthropic API error");
            return Err(TroupeError::provider(format!("Anthropic API error: {message}")));
        }

        let usage = Self::extract_usage(&response);
        if !usage.is_empty() {
            self.state.record_usage(&usage);
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
