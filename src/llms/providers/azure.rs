//! Azure OpenAI provider.
//!
//! OpenAI-shaped bodies against the deployment endpoint:
//! `POST {endpoint}/openai/deployments/{deployment}/chat/completions
//! ?api-version=...` with an `api-key` header.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TroupeError;
use crate::llms::base::{AvailableFunctions, LlmMessage, LlmProvider, ProviderState};
use crate::llms::http::{client_with_timeout, send_json_with_retries, usage_map, RetryPolicy};
use crate::types::usage_metrics::UsageMetrics;

const DEFAULT_API_VERSION: &str = "2024-02-01";
const DEFAULT_TIMEOUT_SECS: f64 = 120.0;

/// Azure OpenAI integration. The model name doubles as the deployment
/// name in the URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureProvider {
    #[serde(flatten)]
    pub state: ProviderState,

    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: Option<String>,
    /// `api-version` query parameter.
    pub api_version: Option<String>,
    /// Request timeout in seconds.
    pub timeout: Option<f64>,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Nucleus sampling.
    pub top_p: Option<f64>,
    /// Completion token cap.
    pub max_tokens: Option<u32>,
    /// Structured-output configuration.
    pub response_format: Option<Value>,
}

impl AzureProvider {
    /// New provider for `model` (the deployment name). Falls back to
    /// `AZURE_API_KEY`, `AZURE_ENDPOINT`, and `AZURE_API_VERSION`.
    pub fn new(model: impl Into<String>, api_key: Option<String>, endpoint: Option<String>) -> Self {
        let mut state = ProviderState::new(model, "azure");
        state.api_key = api_key.or_else(|| std::env::var("AZURE_API_KEY").ok());
        let endpoint = endpoint.or_else(|| std::env::var("AZURE_ENDPOINT").ok());
        state.base_url = endpoint.clone();
        Self {
            state,
            endpoint,
            api_version: std::env::var("AZURE_API_VERSION").ok(),
            timeout: None,
            max_retries: RetryPolicy::default().max_retries,
            top_p: None,
            max_tokens: None,
            response_format: None,
        }
    }

    /// Full chat-completions URL for this deployment.
    pub fn api_url(&self) -> String {
        let endpoint = self
            .endpoint
            .as_deref()
            .or(self.state.base_url.as_deref())
            .unwrap_or("https://YOUR_RESOURCE.openai.azure.com");
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            self.state.model,
            self.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION)
        )
    }

    fn build_request_body(&self, messages: &[LlmMessage], tools: Option<&[Value]>) -> Value {
        let mut body = serde_json::json!({"messages": messages});
        if let Some(temp) = self.state.temperature {
            body["temperature"] = serde_json::json!(temp);
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
        if let Some(tools) = tools {
            if !tools.is_empty() {
                body["tools"] = Value::Array(tools.to_vec());
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
            .ok_or_else(|| TroupeError::provider("no choices[0].message in Azure response"))?;

        if let Some(tool_calls) = message.get("tool_calls") {
            if tool_calls.as_array().is_some_and(|a| !a.is_empty()) {
                return Ok(serde_json::json!({
                    "role": "assistant",
                    "content": message.get("content").cloned().unwrap_or(Value::Null),
                    "tool_calls": tool_calls.clone(),
                }));
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
impl LlmProvider for AzureProvider {
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
        "azure"
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn supports_multimodal(&self) -> bool {
        let model = self.state.model.to_lowercase();
        model.contains("gpt-4o") || model.contains("gpt-4-turbo") || model.contains("gpt-4.1")
    }

    fn supports_stop_words(&self) -> bool {
        self.state.has_stop_words()
    }

    fn get_context_window_size(&self) -> usize {
        let model = &self.state.model;
        if model.contains("gpt-4.1") {
            1_047_576
        } else if model.contains("gpt-4o") || model.contains("gpt-4-turbo") {
            128_000
        } else if model.contains("gpt-4") {
            8_192
        } else {
            16_384
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
            .ok_or_else(|| TroupeError::config("Azure API key not set; set AZURE_API_KEY"))?;
        if self.endpoint.is_none() && self.state.base_url.is_none() {
            return Err(TroupeError::config(
                "Azure endpoint not set; set AZURE_ENDPOINT or pass endpoint",
            ));
        }

        let body = self.build_request_body(&messages, tools.as_deref());
        let url = self.api_url();
        let client = client_with_timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))?;
        let policy = RetryPolicy::with_max_retries(self.max_retries);

        let response = send_json_with_retries(&policy, "Azure API", || {
            Ok(client
                .post(&url)
                .header("Content-Type", "application/json")
                .header("api-key", api_key.as_str())
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
    fn url_embeds_deployment_and_version() {
        let provider = AzureProvider::new(
            "gpt-4o-deploy",
            Some("key".into()),
            Some("https://my-res.openai.azure.com/".into()),
        );
        let url = provider.api_url();
        assert_eq!(
            url,
            format!(
                "https://my-res.openai.azure.com/openai/deployments/gpt-4o-deploy/chat/completions?api-version={}",
                DEFAULT_API_VERSION
            )
        );
    }

    #[test]
    fn response_parsing_is_openai_shaped() {
        let provider = AzureProvider::new("gpt-4o", Some("key".into()), Some("https://e".into()));
        let response = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "hello"}}]
        });
        assert_eq!(
            provider.parse_response(&response).unwrap(),
            Value::String("hello".into())
        );
    }

    #[tokio::test]
    async fn missing_endpoint_is_a_config_error() {
        let mut provider = AzureProvider::new("gpt-4o", Some("key".into()), None);
        provider.endpoint = None;
        provider.state.base_url = None;
        let result = provider
            .acall(ProviderState::string_to_messages("hi"), None, None)
            .await;
        assert!(matches!(result, Err(TroupeError::Config(_))));
    }
}
