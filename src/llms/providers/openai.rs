//! OpenAI chat-completions provider.
//!
//! `POST {base}/chat/completions` with a Bearer key and optional
//! organization / project headers. Also implements SSE streaming over the
//! same endpoint.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TroupeError;
use crate::llms::base::{AvailableFunctions, LlmMessage, LlmProvider, ProviderState};
use crate::llms::http::{client_with_timeout, send_json_with_retries, usage_map, RetryPolicy};
use crate::llms::streaming::{
    ChannelStreamReceiver, StreamChunk, StreamReceiver, StreamUsage, StreamingLlm,
};
use crate::types::usage_metrics::UsageMetrics;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: f64 = 120.0;

/// OpenAI chat-completions integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiProvider {
    #[serde(flatten)]
    pub state: ProviderState,

    /// Organization header for multi-tenant accounts.
    pub organization: Option<String>,
    /// Project header for project-scoped keys.
    pub project: Option<String>,
    /// Request timeout in seconds.
    pub timeout: Option<f64>,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Extra headers sent with every request.
    pub default_headers: Option<HashMap<String, String>>,

    /// Nucleus sampling.
    pub top_p: Option<f64>,
    /// Frequency penalty (-2..=2).
    pub frequency_penalty: Option<f64>,
    /// Presence penalty (-2..=2).
    pub presence_penalty: Option<f64>,
    /// Completion token cap.
    pub max_tokens: Option<u32>,
    /// Seed for reproducible sampling.
    pub seed: Option<i64>,
    /// Structured-output configuration.
    pub response_format: Option<Value>,
    /// Effort knob for reasoning models.
    pub reasoning_effort: Option<String>,
}

impl OpenAiProvider {
    /// New provider for `model`. The key falls back to `OPENAI_API_KEY`,
    /// the organization to `OPENAI_ORGANIZATION`.
    pub fn new(model: impl Into<String>, api_key: Option<String>, base_url: Option<String>) -> Self {
        let mut state = ProviderState::new(model, "openai");
        state.api_key = api_key.or_else(|| std::env::var("OPENAI_API_KEY").ok());
        state.base_url = base_url;
        Self {
            state,
            organization: std::env::var("OPENAI_ORGANIZATION").ok(),
            project: None,
            timeout: None,
            max_retries: RetryPolicy::default().max_retries,
            default_headers: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            max_tokens: None,
            seed: None,
            response_format: None,
            reasoning_effort: None,
        }
    }

    fn api_base_url(&self) -> String {
        self.state
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base_url())
    }

    /// Assemble the chat-completions body.
    pub fn build_request_body(&self, messages: &[LlmMessage], tools: Option<&[Value]>) -> Value {
        let mut body = serde_json::json!({
            "model": self.state.model,
            "messages": messages,
        });
        if let Some(temp) = self.state.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(top_p) = self.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
        if let Some(penalty) = self.frequency_penalty {
            body["frequency_penalty"] = serde_json::json!(penalty);
        }
        if let Some(penalty) = self.presence_penalty {
            body["presence_penalty"] = serde_json::json!(penalty);
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
            body["reasoning_effort"] = serde_json::json!(effort);
        }
        if let Some(tools) = tools {
            if !tools.is_empty() {
                body["tools"] = serde_json::json!(tools);
                body["tool_choice"] = serde_json::json!("auto");
            }
        }
        body
    }

    fn authed_request(
        &self,
        client: &reqwest::Client,
        endpoint: &str,
        api_key: &str,
    ) -> reqwest::RequestBuilder {
        let mut request = client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", api_key));
        if let Some(ref org) = self.organization {
            request = request.header("OpenAI-Organization", org);
        }
        if let Some(ref project) = self.project {
            request = request.header("OpenAI-Project", project);
        }
        if let Some(ref headers) = self.default_headers {
            for (k, v) in headers {
                request = request.header(k, v);
            }
        }
        request
    }

    /// Read `choices[0].message` into the canonical shape.
    fn parse_response(&self, response: &Value) -> Result<Value, TroupeError> {
        let message = response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| TroupeError::provider("no choices[0].message in OpenAI response"))?;

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

    fn require_api_key(&self) -> Result<&str, TroupeError> {
        self.state.api_key.as_deref().ok_or_else(|| {
            TroupeError::config(
                "OpenAI API key not set; set OPENAI_API_KEY or pass api_key to the constructor",
            )
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
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
        "openai"
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn supports_multimodal(&self) -> bool {
        let model = self.state.model.to_lowercase();
        model.contains("gpt-4o")
            || model.contains("gpt-4-turbo")
            || model.contains("gpt-4.1")
            || model.contains("gpt-5")
    }

    fn supports_stop_words(&self) -> bool {
        self.state.has_stop_words()
    }

    fn get_context_window_size(&self) -> usize {
        let model = &self.state.model;
        if model.contains("gpt-4.1") {
            1_047_576
        } else if model.contains("gpt-5") || model.contains("o3-mini") || model.contains("o4-mini")
        {
            200_000
        } else if model.contains("gpt-4o") || model.contains("gpt-4-turbo") || model.contains("o1")
            || model.contains("o3")
        {
            128_000
        } else if model.contains("gpt-4-32k") {
            32_768
        } else if model.contains("gpt-4") {
            8_192
        } else if model.contains("gpt-3.5-turbo-16k") {
            16_384
        } else {
            4_096
        }
    }

    async fn acall(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<Value>>,
        _available_functions: Option<AvailableFunctions>,
    ) -> Result<Value, TroupeError> {
        let api_key = self.require_api_key()?.to_string();
        let body = self.build_request_body(&messages, tools.as_deref());
        let endpoint = self.endpoint();
        let client = client_with_timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))?;
        let policy = RetryPolicy::with_max_retries(self.max_retries);

        let response = send_json_with_retries(&policy, "OpenAI API", || {
            Ok(self.authed_request(&client, &endpoint, &api_key).json(&body))
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

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

/// Incremental decoder for `text/event-stream` bodies. Buffers partial
/// lines across network chunks and yields complete `data:` payloads.
struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    fn feed(&mut self, bytes: &Bytes) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                events.push(data.trim().to_string());
            }
        }
        events
    }
}

#[async_trait]
impl StreamingLlm for OpenAiProvider {
    async fn stream(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<Value>>,
    ) -> Result<Box<dyn StreamReceiver>, TroupeError> {
        let api_key = self.require_api_key()?.to_string();
        let mut body = self.build_request_body(&messages, tools.as_deref());
        body["stream"] = serde_json::json!(true);
        body["stream_options"] = serde_json::json!({"include_usage": true});

        let client = client_with_timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))?;
        let request = self.authed_request(&client, &self.endpoint(), &api_key).json(&body);

        let response = request
            .send()
            .await
            .map_err(|e| TroupeError::provider(format!("OpenAI stream connect error: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TroupeError::provider(format!(
                "OpenAI stream error ({}): {}",
                status, text
            )));
        }

        let (tx, receiver) = ChannelStreamReceiver::pair(64);
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut content = String::new();
            let mut tool_calls: HashMap<usize, Value> = HashMap::new();
            let mut usage: Option<StreamUsage> = None;

            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(StreamChunk::Error {
                                message: format!("stream read error: {e}"),
                            })
                            .await;
                        return;
                    }
                };

                for data in decoder.feed(&bytes) {
                    if data == "[DONE]" {
                        let mut calls: Vec<(usize, Value)> = tool_calls.drain().collect();
                        calls.sort_by_key(|(i, _)| *i);
                        let calls: Vec<Value> = calls.into_iter().map(|(_, v)| v).collect();
                        let _ = tx
                            .send(StreamChunk::Done {
                                content: content.clone(),
                                tool_calls: if calls.is_empty() { None } else { Some(calls) },
                                usage: usage.clone(),
                            })
                            .await;
                        return;
                    }

                    let event: Value = match serde_json::from_str(&data) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };

                    if let Some(u) = event.get("usage").filter(|u| !u.is_null()) {
                        usage = Some(StreamUsage {
                            prompt_tokens: u
                                .get("prompt_tokens")
                                .and_then(Value::as_i64)
                                .unwrap_or(0),
                            completion_tokens: u
                                .get("completion_tokens")
                                .and_then(Value::as_i64)
                                .unwrap_or(0),
                            total_tokens: u
                                .get("total_tokens")
                                .and_then(Value::as_i64)
                                .unwrap_or(0),
                        });
                    }

                    let delta = match event
                        .get("choices")
                        .and_then(|c| c.get(0))
                        .and_then(|c| c.get("delta"))
                    {
                        Some(d) => d,
                        None => continue,
                    };

                    if let Some(text) = delta.get("content").and_then(Value::as_str) {
                        if !text.is_empty() {
                            content.push_str(text);
                            let _ = tx
                                .send(StreamChunk::TextDelta {
                                    text: text.to_string(),
                                })
                                .await;
                        }
                    }

                    if let Some(deltas) = delta.get("tool_calls").and_then(Value::as_array) {
                        for tc in deltas {
                            let index =
                                tc.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                            let id = tc.get("id").and_then(Value::as_str).map(str::to_string);
                            let name = tc
                                .get("function")
                                .and_then(|f| f.get("name"))
                                .and_then(Value::as_str)
                                .map(str::to_string);
                            let arguments = tc
                                .get("function")
                                .and_then(|f| f.get("arguments"))
                                .and_then(Value::as_str)
                                .map(str::to_string);

                            let entry = tool_calls.entry(index).or_insert_with(|| {
                                serde_json::json!({
                                    "id": "",
                                    "type": "function",
                                    "function": {"name": "", "arguments": ""}
                                })
                            });
                            if let Some(ref id) = id {
                                entry["id"] = serde_json::json!(id);
                            }
                            if let Some(ref name) = name {
                                entry["function"]["name"] = serde_json::json!(name);
                            }
                            if let Some(ref arguments) = arguments {
                                let joined = format!(
                                    "{}{}",
                                    entry["function"]["arguments"].as_str().unwrap_or_default(),
                                    arguments
                                );
                                entry["function"]["arguments"] = serde_json::json!(joined);
                            }

                            let _ = tx
                                .send(StreamChunk::ToolCallDelta {
                                    index,
                                    id,
                                    name,
                                    arguments,
                                })
                                .await;
                        }
                    }
                }
            }

            // Stream ended without [DONE]; hand back whatever accumulated.
            let _ = tx
                .send(StreamChunk::Done {
                    content,
                    tool_calls: None,
                    usage,
                })
                .await;
        });

        Ok(Box::new(receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_maps_parameters() {
        let mut provider = OpenAiProvider::new("gpt-4o", Some("sk-test".into()), None);
        provider.state.temperature = Some(0.2);
        provider.max_tokens = Some(512);
        provider.seed = Some(7);
        provider.state.stop = vec!["Observation:".to_string()];

        let messages = ProviderState::string_to_messages("hi");
        let tools = vec![serde_json::json!({
            "type": "function",
            "function": {"name": "search", "parameters": {}}
        })];
        let body = provider.build_request_body(&messages, Some(&tools));

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["seed"], 7);
        assert_eq!(body["stop"][0], "Observation:");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn parse_text_response_applies_stop_words() {
        let mut provider = OpenAiProvider::new("gpt-4o", Some("sk-test".into()), None);
        provider.state.stop = vec!["Observation:".to_string()];
        let response = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Thought: done\nObservation: x"}}]
        });
        let parsed = provider.parse_response(&response).unwrap();
        assert_eq!(parsed, Value::String("Thought: done".to_string()));
    }

    #[test]
    fn parse_tool_call_response_passes_message_through() {
        let provider = OpenAiProvider::new("gpt-4o", Some("sk-test".into()), None);
        let response = serde_json::json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{"id": "call_1", "type": "function",
                                "function": {"name": "search", "arguments": "{\"q\":\"rust\"}"}}]
            }}]
        });
        let parsed = provider.parse_response(&response).unwrap();
        assert_eq!(parsed["tool_calls"][0]["function"]["name"], "search");
    }

    #[test]
    fn context_windows_by_family() {
        assert_eq!(
            OpenAiProvider::new("gpt-4o", Some("k".into()), None).get_context_window_size(),
            128_000
        );
        assert_eq!(
            OpenAiProvider::new("o3-mini", Some("k".into()), None).get_context_window_size(),
            200_000
        );
        assert_eq!(
            OpenAiProvider::new("gpt-4", Some("k".into()), None).get_context_window_size(),
            8_192
        );
    }

    #[test]
    fn sse_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::new();
        let first = decoder.feed(&Bytes::from_static(b"data: {\"a\":"));
        assert!(first.is_empty());
        let second = decoder.feed(&Bytes::from_static(b"1}\n\ndata: [DONE]\n"));
        assert_eq!(second, vec!["{\"a\":1}".to_string(), "[DONE]".to_string()]);
    }

    /// Minimal scripted HTTP listener: answers each connection with the
    /// next `(status, body)` pair, then reports how many it served.
    async fn serve_scripted(
        responses: Vec<(u16, &'static str)>,
    ) -> (std::net::SocketAddr, tokio::task::JoinHandle<usize>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut served = 0usize;
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let reason = match status {
                    200 => "OK",
                    429 => "Too Many Requests",
                    500 => "Internal Server Error",
                    _ => "Error",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                served += 1;
            }
            served
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn transient_statuses_retry_until_success() {
        let ok_body = r#"{"choices":[{"message":{"role":"assistant","content":"recovered"}}],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#;
        let (addr, handle) =
            serve_scripted(vec![(429, "{}"), (500, "{}"), (200, ok_body)]).await;

        // Default policy: two retries, three attempts total.
        let provider = OpenAiProvider::new(
            "gpt-4o",
            Some("sk-test".into()),
            Some(format!("http://{addr}")),
        );
        let result = provider
            .acall(ProviderState::string_to_messages("hi"), None, None)
            .await
            .unwrap();

        assert_eq!(result, Value::String("recovered".into()));
        assert_eq!(handle.await.unwrap(), 3);
        let usage = provider.get_token_usage_summary();
        assert_eq!(usage.successful_requests, 1);
        assert_eq!(usage.total_tokens, 5);
    }

    #[tokio::test]
    async fn client_errors_do_not_retry() {
        let (addr, handle) =
            serve_scripted(vec![(401, "{\"error\": \"bad key\"}")]).await;
        let provider = OpenAiProvider::new(
            "gpt-4o",
            Some("sk-test".into()),
            Some(format!("http://{addr}")),
        );
        let result = provider
            .acall(ProviderState::string_to_messages("hi"), None, None)
            .await;
        assert!(matches!(result, Err(TroupeError::Provider(_))));
        assert_eq!(handle.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_api_key_is_a_config_error() {
        let mut provider = OpenAiProvider::new("gpt-4o", Some("sk".into()), None);
        provider.state.api_key = None;
        let result = provider
            .acall(ProviderState::string_to_messages("hi"), None, None)
            .await;
        assert!(matches!(result, Err(TroupeError::Config(_))));
    }
}
