//! Google Gemini provider.
//!
//! `POST .../models/{model}:generateContent`, authenticated by an API-key
//! query parameter (Gemini API) or a Bearer token (Vertex). Messages are
//! reshaped to `contents` with `parts`; system text goes to
//! `systemInstruction`; tools become `functionDeclarations`. Gemini does
//! not return tool-call ids, so canonical ids are fabricated.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::TroupeError;
use crate::llms::base::{AvailableFunctions, LlmMessage, LlmProvider, ProviderState};
use crate::llms::http::{client_with_timeout, send_json_with_retries, usage_map, RetryPolicy};
use crate::types::usage_metrics::UsageMetrics;

const DEFAULT_TIMEOUT_SECS: f64 = 120.0;
const DEFAULT_LOCATION: &str = "us-central1";

/// Google Gemini / Vertex integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiProvider {
    #[serde(flatten)]
    pub state: ProviderState,

    /// Google Cloud project (Vertex only).
    pub project: Option<String>,
    /// Google Cloud location (Vertex only).
    pub location: Option<String>,
    /// Whether to route through Vertex AI.
    pub use_vertexai: bool,
    /// Request timeout in seconds.
    pub timeout: Option<f64>,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Nucleus sampling.
    pub top_p: Option<f64>,
    /// Top-K sampling.
    pub top_k: Option<u32>,
    /// Output token cap.
    pub max_output_tokens: Option<u32>,
}

impl GeminiProvider {
    /// New provider for `model`. The key falls back to `GOOGLE_API_KEY`
    /// then `GEMINI_API_KEY`; Vertex settings come from
    /// `GOOGLE_CLOUD_PROJECT`, `GOOGLE_CLOUD_LOCATION`, and
    /// `GOOGLE_GENAI_USE_VERTEXAI`.
    pub fn new(model: impl Into<String>, api_key: Option<String>) -> Self {
        let mut state = ProviderState::new(model, "gemini");
        state.api_key = api_key
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok());
        Self {
            state,
            project: std::env::var("GOOGLE_CLOUD_PROJECT").ok(),
            location: std::env::var("GOOGLE_CLOUD_LOCATION")
                .ok()
                .or_else(|| Some(DEFAULT_LOCATION.to_string())),
            use_vertexai: std::env::var("GOOGLE_GENAI_USE_VERTEXAI")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            timeout: None,
            max_retries: RetryPolicy::default().max_retries,
            top_p: None,
            top_k: None,
            max_output_tokens: None,
        }
    }

    fn endpoint(&self) -> String {
        if self.use_vertexai {
            let project = self.project.as_deref().unwrap_or("default");
            let location = self.location.as_deref().unwrap_or(DEFAULT_LOCATION);
            format!(
                "https://{location}-aiplatform.googleapis.com/v1/projects/{project}/locations/{location}/publishers/google/models/{}:generateContent",
                self.state.model
            )
        } else {
            format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.state.model
            )
        }
    }

    fn generation_config(&self) -> Value {
        let mut config = serde_json::Map::new();
        if let Some(temp) = self.state.temperature {
            config.insert("temperature".into(), serde_json::json!(temp));
        }
        if let Some(max) = self.max_output_tokens {
            config.insert("maxOutputTokens".into(), serde_json::json!(max));
        }
        if let Some(top_p) = self.top_p {
            config.insert("topP".into(), serde_json::json!(top_p));
        }
        if let Some(top_k) = self.top_k {
            config.insert("topK".into(), serde_json::json!(top_k));
        }
        if !self.state.stop.is_empty() {
            config.insert("stopSequences".into(), serde_json::json!(self.state.stop));
        }
        Value::Object(config)
    }

    /// Reshape canonical messages to `contents`/`parts`. Returns the
    /// extracted system text alongside.
    fn reshape_messages(&self, messages: &[LlmMessage]) -> (Option<String>, Vec<Value>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();

        for msg in messages {
            let role = msg.get("role").and_then(Value::as_str).unwrap_or("user");
            let content = msg.get("content").cloned().unwrap_or(Value::Null);

            match role {
                "system" => {
                    if let Some(text) = content.as_str() {
                        system_parts.push(text.to_string());
                    }
                }
                "tool" => {
                    let name = msg
                        .get("tool_call_id")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    contents.push(serde_json::json!({
                        "role": "function",
                        "parts": [{
                            "functionResponse": {
                                "name": name,
                                "response": {"result": content.as_str().unwrap_or_default()}
                            }
                        }]
                    }));
                }
                "assistant" => {
                    let mut parts: Vec<Value> = Vec::new();
                    if let Some(text) = content.as_str() {
                        if !text.is_empty() {
                            parts.push(serde_json::json!({"text": text}));
                        }
                    }
                    if let Some(tool_calls) = msg.get("tool_calls").and_then(Value::as_array) {
                        for tc in tool_calls {
                            let function = tc.get("function").cloned().unwrap_or(Value::Null);
                            let name = function
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or_default();
                            let arguments = function
                                .get("arguments")
                                .and_then(Value::as_str)
                                .unwrap_or("{}");
                            let args: Value = serde_json::from_str(arguments)
                                .unwrap_or_else(|_| serde_json::json!({}));
                            parts.push(serde_json::json!({
                                "functionCall": {"name": name, "args": args}
                            }));
                        }
                    }
                    if parts.is_empty() {
                        parts.push(serde_json::json!({"text": ""}));
                    }
                    contents.push(serde_json::json!({"role": "model", "parts": parts}));
                }
                _ => {
                    contents.push(serde_json::json!({
                        "role": "user",
                        "parts": [{"text": content.as_str().unwrap_or_default()}]
                    }));
                }
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, contents)
    }

    /// Assemble the generateContent body.
    pub fn build_request_body(&self, messages: &[LlmMessage], tools: Option<&[Value]>) -> Value {
        let (system, contents) = self.reshape_messages(messages);
        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": self.generation_config(),
        });
        if let Some(system) = system {
            body["systemInstruction"] = serde_json::json!({"parts": [{"text": system}]});
        }
        if let Some(tools) = tools {
            if !tools.is_empty() {
                let declarations: Vec<Value> = tools
                    .iter()
                    .map(|tool| tool.get("function").cloned().unwrap_or_else(|| tool.clone()))
                    .collect();
                body["tools"] = serde_json::json!([{"functionDeclarations": declarations}]);
            }
        }
        body
    }

    /// Walk `candidates[0].content.parts`; `functionCall` parts get
    /// fabricated ids.
    fn parse_response(&self, response: &Value) -> Result<Value, TroupeError> {
        let parts = response
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .ok_or_else(|| TroupeError::provider("no candidates[0].content.parts in Gemini response"))?;

        let mut text_parts: Vec<String> = Vec::new();
        let mut tool_calls: Vec<Value> = Vec::new();

        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                text_parts.push(text.to_string());
            }
            if let Some(fc) = part.get("functionCall") {
                let name = fc.get("name").and_then(Value::as_str).unwrap_or_default();
                let args = fc.get("args").cloned().unwrap_or(Value::Null);
                tool_calls.push(serde_json::json!({
                    "id": format!("call_{}", Uuid::new_v4()),
                    "type": "function",
                    "function": {
                        "name": name,
                        "arguments": serde_json::to_string(&args).unwrap_or_default(),
                    }
                }));
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
}

#[async_trait]
impl LlmProvider for GeminiProvider {
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
        "gemini"
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
        let model = self.state.model.to_lowercase();
        if model.contains("1.5-pro") {
            2_097_152
        } else {
            1_048_576
        }
    }

    async fn acall(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<Value>>,
        _available_functions: Option<AvailableFunctions>,
    ) -> Result<Value, TroupeError> {
        let api_key = self.state.api_key.clone().ok_or_else(|| {
            TroupeError::config("Gemini API key not set; set GOOGLE_API_KEY or GEMINI_API_KEY")
        })?;

        let body = self.build_request_body(&messages, tools.as_deref());
        let endpoint = self.endpoint();
        let client = client_with_timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))?;
        let policy = RetryPolicy::with_max_retries(self.max_retries);
        let use_vertex = self.use_vertexai;

        let response = send_json_with_retries(&policy, "Gemini API", || {
            let mut request = client
                .post(&endpoint)
                .header("content-type", "application/json");
            if use_vertex {
                request = request.header("authorization", format!("Bearer {}", api_key));
            } else {
                request = request.query(&[("key", api_key.as_str())]);
            }
            Ok(request.json(&body))
        })
        .await?;

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown Gemini API error");
            return Err(TroupeError::provider(format!("Gemini API error: {message}")));
        }

        if let Some(usage) = response.get("usageMetadata") {
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

    fn msg(pairs: &[(&str, Value)]) -> LlmMessage {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn roles_map_to_gemini_vocabulary() {
        let provider = GeminiProvider::new("gemini-2.0-flash-001", Some("k".into()));
        let messages = vec![
            msg(&[("role", serde_json::json!("system")), ("content", serde_json::json!("Be terse."))]),
            msg(&[("role", serde_json::json!("user")), ("content", serde_json::json!("Hi"))]),
            msg(&[("role", serde_json::json!("assistant")), ("content", serde_json::json!("Hello"))]),
            msg(&[
                ("role", serde_json::json!("tool")),
                ("tool_call_id", serde_json::json!("lookup")),
                ("content", serde_json::json!("result text")),
            ]),
        ];
        let body = provider.build_request_body(&messages, None);

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be terse.");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "function");
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"]["result"],
            "result text"
        );
    }

    #[test]
    fn tools_become_function_declarations() {
        let provider = GeminiProvider::new("gemini-2.0-flash-001", Some("k".into()));
        let tools = vec![serde_json::json!({
            "type": "function",
            "function": {"name": "search", "description": "find", "parameters": {}}
        })];
        let messages = vec![msg(&[
            ("role", serde_json::json!("user")),
            ("content", serde_json::json!("go")),
        ])];
        let body = provider.build_request_body(&messages, Some(&tools));
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "search"
        );
    }

    #[test]
    fn function_calls_get_fabricated_ids() {
        let provider = GeminiProvider::new("gemini-2.0-flash-001", Some("k".into()));
        let response = serde_json::json!({
            "candidates": [{"content": {"parts": [
                {"functionCall": {"name": "search", "args": {"q": "rust"}}}
            ]}}]
        });
        let parsed = provider.parse_response(&response).unwrap();
        let call = &parsed["tool_calls"][0];
        assert!(call["id"].as_str().unwrap().starts_with("call_"));
        assert_eq!(call["function"]["name"], "search");
    }

    #[test]
    fn text_parts_concatenate() {
        let provider = GeminiProvider::new("gemini-2.0-flash-001", Some("k".into()));
        let response = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "a"}, {"text": "b"}]}}]
        });
        assert_eq!(
            provider.parse_response(&response).unwrap(),
            Value::String("ab".into())
        );
    }
}
