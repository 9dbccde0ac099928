//! AWS Bedrock provider over the Converse API.
//!
//! `POST /model/{id}/converse` on `bedrock-runtime.{region}.amazonaws.com`,
//! signed with SigV4 over the header set sorted by lowercase name. Model
//! ids carry colons, which must be `%3A`-encoded in the path. Requests are
//! re-signed on every retry so the `x-amz-date` stays fresh.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TroupeError;
use crate::llms::base::{AvailableFunctions, LlmMessage, LlmProvider, ProviderState};
use crate::llms::http::{client_with_timeout, send_json_with_retries, RetryPolicy};
use crate::types::usage_metrics::UsageMetrics;

const SERVICE: &str = "bedrock";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_TIMEOUT_SECS: f64 = 120.0;
const DEFAULT_MAX_TOKENS: u32 = 4096;

// ---------------------------------------------------------------------------
// SigV4
// ---------------------------------------------------------------------------

mod sigv4 {
    use hmac::{Hmac, Mac};
    use sha2::{Digest, Sha256};

    type HmacSha256 = Hmac<Sha256>;

    pub fn sha256_hex(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    /// Derive the per-day signing key: date → region → service → request.
    pub fn signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
        let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, region.as_bytes());
        let k_service = hmac_sha256(&k_region, service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }

    pub fn sign_hex(key: &[u8], message: &str) -> String {
        hex::encode(hmac_sha256(key, message.as_bytes()))
    }

    /// Canonical request: method, path, query, lowercased sorted headers,
    /// signed-header list, payload hash.
    pub fn canonical_request(
        method: &str,
        uri: &str,
        query: &str,
        headers: &[(String, String)],
        signed_headers: &str,
        payload_hash: &str,
    ) -> String {
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k.to_lowercase(), v.trim()))
            .collect();
        format!("{method}\n{uri}\n{query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}")
    }

    pub fn string_to_sign(amz_date: &str, scope: &str, canonical_hash: &str) -> String {
        format!("AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{canonical_hash}")
    }

    pub fn authorization_header(
        access_key: &str,
        scope: &str,
        signed_headers: &str,
        signature: &str,
    ) -> String {
        format!(
            "AWS4-HMAC-SHA256 Credential={access_key}/{scope}, SignedHeaders={signed_headers}, Signature={signature}"
        )
    }
}

// ---------------------------------------------------------------------------
// BedrockProvider
// ---------------------------------------------------------------------------

/// AWS Bedrock Converse integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedrockProvider {
    #[serde(flatten)]
    pub state: ProviderState,

    /// AWS region; defaults through `AWS_DEFAULT_REGION` / `AWS_REGION`.
    pub region_name: Option<String>,
    /// AWS profile from `AWS_PROFILE`, recorded for diagnostics.
    pub profile_name: Option<String>,
    #[serde(skip_serializing)]
    pub aws_access_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub aws_secret_access_key: Option<String>,
    #[serde(skip_serializing)]
    pub aws_session_token: Option<String>,

    /// Request timeout in seconds.
    pub timeout: Option<f64>,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Response token cap; Converse requires a value (default 4096).
    pub max_tokens: Option<u32>,
    /// Nucleus sampling.
    pub top_p: Option<f64>,
}

impl BedrockProvider {
    /// New provider for a Bedrock model id. Credentials come from the
    /// standard AWS environment variables.
    pub fn new(
        model: impl Into<String>,
        region_name: Option<String>,
        profile_name: Option<String>,
    ) -> Self {
        let region_name = region_name
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .or_else(|| std::env::var("AWS_REGION").ok())
            .or_else(|| Some(DEFAULT_REGION.to_string()));
        let state = ProviderState::new(model, "bedrock");
        Self {
            state,
            region_name,
            profile_name: profile_name.or_else(|| std::env::var("AWS_PROFILE").ok()),
            aws_access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
            aws_secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
            aws_session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
            timeout: None,
            max_retries: RetryPolicy::default().max_retries,
            max_tokens: None,
            top_p: None,
        }
    }

    fn region(&self) -> &str {
        self.region_name.as_deref().unwrap_or(DEFAULT_REGION)
    }

    fn host(&self) -> String {
        format!("bedrock-runtime.{}.amazonaws.com", self.region())
    }

    /// Converse path with the model id's colons percent-encoded.
    fn converse_uri(&self) -> String {
        format!("/model/{}/converse", self.state.model.replace(':', "%3A"))
    }

    /// Reshape canonical messages into Converse form. Returns the system
    /// blocks alongside.
    fn reshape_messages(&self, messages: &[LlmMessage]) -> (Vec<Value>, Vec<Value>) {
        let mut system: Vec<Value> = Vec::new();
        let mut converse: Vec<Value> = Vec::new();

        for msg in messages {
            let role = msg.get("role").and_then(Value::as_str).unwrap_or("user");
            let content = msg.get("content").cloned().unwrap_or(Value::Null);

            match role {
                "system" => {
                    if let Some(text) = content.as_str() {
                        system.push(serde_json::json!({"text": text}));
                    }
                }
                "tool" => {
                    let tool_use_id = msg
                        .get("tool_call_id")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    converse.push(serde_json::json!({
                        "role": "user",
                        "content": [{
                            "toolResult": {
                                "toolUseId": tool_use_id,
                                "content": [{"text": content.as_str().unwrap_or_default()}],
                                "status": "success"
                            }
                        }]
                    }));
                }
                "assistant" => {
                    let mut blocks: Vec<Value> = Vec::new();
                    if let Some(text) = content.as_str() {
                        if !text.is_empty() {
                            blocks.push(serde_json::json!({"text": text}));
                        }
                    }
                    if let Some(tool_calls) = msg.get("tool_calls").and_then(Value::as_array) {
                        for tc in tool_calls {
                            let id = tc.get("id").and_then(Value::as_str).unwrap_or("unknown");
                            let function = tc.get("function").cloned().unwrap_or(Value::Null);
                            let name = function
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or_default();
                            let arguments = function
                                .get("arguments")
                                .and_then(Value::as_str)
                                .unwrap_or("{}");
                            let input: Value = serde_json::from_str(arguments)
                                .unwrap_or_else(|_| serde_json::json!({}));
                            blocks.push(serde_json::json!({
                                "toolUse": {"toolUseId": id, "name": name, "input": input}
                            }));
                        }
                    }
                    if blocks.is_empty() {
                        blocks.push(serde_json::json!({"text": ""}));
                    }
                    converse.push(serde_json::json!({"role": "assistant", "content": blocks}));
                }
                _ => {
                    converse.push(serde_json::json!({
                        "role": "user",
                        "content": [{"text": content.as_str().unwrap_or_default()}]
                    }));
                }
            }
        }

        (system, converse)
    }

    /// Assemble the Converse body.
    pub fn build_request_body(&self, messages: &[LlmMessage], tools: Option<&[Value]>) -> Value {
        let (system, converse) = self.reshape_messages(messages);
        let mut body = serde_json::json!({"messages": converse});
        if !system.is_empty() {
            body["system"] = Value::Array(system);
        }

        let mut config = serde_json::Map::new();
        config.insert(
            "maxTokens".into(),
            serde_json::json!(self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        );
        if let Some(temp) = self.state.temperature {
            config.insert("temperature".into(), serde_json::json!(temp));
        }
        if let Some(top_p) = self.top_p {
            config.insert("topP".into(), serde_json::json!(top_p));
        }
        if !self.state.stop.is_empty() {
            config.insert("stopSequences".into(), serde_json::json!(self.state.stop));
        }
        body["inferenceConfig"] = Value::Object(config);

        if let Some(tools) = tools {
            if !tools.is_empty() {
                let specs: Vec<Value> = tools
                    .iter()
                    .map(|tool| {
                        let function = tool.get("function").unwrap_or(tool);
                        serde_json::json!({
                            "toolSpec": {
                                "name": function.get("name").and_then(Value::as_str).unwrap_or("unknown"),
                                "description": function.get("description").and_then(Value::as_str).unwrap_or_default(),
                                "inputSchema": {
                                    "json": function.get("parameters").cloned()
                                        .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}}))
                                }
                            }
                        })
                    })
                    .collect();
                body["toolConfig"] = serde_json::json!({"tools": specs});
            }
        }

        body
    }

    /// Walk `output.message.content[]` into the canonical shape.
    fn parse_response(&self, response: &Value) -> Result<Value, TroupeError> {
        let blocks = response
            .get("output")
            .and_then(|o| o.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
            .ok_or_else(|| TroupeError::provider("no output.message.content in Bedrock response"))?;

        let mut text_parts: Vec<String> = Vec::new();
        let mut tool_calls: Vec<Value> = Vec::new();

        for block in blocks {
            if let Some(text) = block.get("text").and_then(Value::as_str) {
                text_parts.push(text.to_string());
            }
            if let Some(tool_use) = block.get("toolUse") {
                let id = tool_use
                    .get("toolUseId")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let name = tool_use
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let input = tool_use.get("input").cloned().unwrap_or(Value::Null);
                tool_calls.push(serde_json::json!({
                    "id": id,
                    "type": "function",
                    "function": {
                        "name": name,
                        "arguments": serde_json::to_string(&input).unwrap_or_default(),
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

    fn extract_usage(response: &Value) -> HashMap<String, Value> {
        let mut usage = HashMap::new();
        if let Some(u) = response.get("usage") {
            if let Some(v) = u.get("inputTokens").and_then(Value::as_i64) {
                usage.insert("prompt_tokens".to_string(), serde_json::json!(v));
            }
            if let Some(v) = u.get("outputTokens").and_then(Value::as_i64) {
                usage.insert("completion_tokens".to_string(), serde_json::json!(v));
            }
        }
        usage
    }

    /// SigV4-sign one attempt. Returns the full header set for the
    /// request, Authorization included.
    fn sign_request(
        &self,
        method: &str,
        uri: &str,
        payload: &[u8],
    ) -> Result<Vec<(String, String)>, TroupeError> {
        let access_key = self
            .aws_access_key_id
            .as_deref()
            .ok_or_else(|| TroupeError::config("AWS_ACCESS_KEY_ID not set"))?;
        let secret_key = self
            .aws_secret_access_key
            .as_deref()
            .ok_or_else(|| TroupeError::config("AWS_SECRET_ACCESS_KEY not set"))?;
        let region = self.region();

        let now = chrono::Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let scope = format!("{date_stamp}/{region}/{SERVICE}/aws4_request");

        let payload_hash = sigv4::sha256_hex(payload);
        let mut headers: Vec<(String, String)> = vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("host".to_string(), self.host()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.aws_session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical =
            sigv4::canonical_request(method, uri, "", &headers, &signed_headers, &payload_hash);
        let to_sign = sigv4::string_to_sign(&amz_date, &scope, &sigv4::sha256_hex(canonical.as_bytes()));
        let key = sigv4::signing_key(secret_key, &date_stamp, region, SERVICE);
        let signature = sigv4::sign_hex(&key, &to_sign);
        let authorization =
            sigv4::authorization_header(access_key, &scope, &signed_headers, &signature);

        let mut request_headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Host".to_string(), self.host()),
            ("X-Amz-Date".to_string(), amz_date),
            ("Authorization".to_string(), authorization),
        ];
        if let Some(ref token) = self.aws_session_token {
            request_headers.push(("X-Amz-Security-Token".to_string(), token.clone()));
        }
        Ok(request_headers)
    }
}

#[async_trait]
impl LlmProvider for BedrockProvider {
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
        "bedrock"
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn supports_multimodal(&self) -> bool {
        let model = self.state.model.to_lowercase();
        model.contains("claude") || model.contains("nova-pro") || model.contains("nova-lite")
    }

    fn supports_stop_words(&self) -> bool {
        self.state.has_stop_words()
    }

    fn get_context_window_size(&self) -> usize {
        let model = self.state.model.to_lowercase();
        if model.contains("nova-premier") {
            1_000_000
        } else if model.contains("nova-pro") || model.contains("nova-lite") {
            300_000
        } else if model.contains("claude") {
            200_000
        } else if model.contains("nova-micro") || model.contains("llama3") {
            128_000
        } else {
            32_000
        }
    }

    async fn acall(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<Value>>,
        _available_functions: Option<AvailableFunctions>,
    ) -> Result<Value, TroupeError> {
        let body = self.build_request_body(&messages, tools.as_deref());
        let payload = serde_json::to_vec(&body)
            .map_err(|e| TroupeError::provider(format!("failed to encode Converse body: {e}")))?;

        let uri = self.converse_uri();
        let endpoint = format!("https://{}{}", self.host(), uri);
        let client = client_with_timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))?;
        let policy = RetryPolicy::with_max_retries(self.max_retries);

        let response = send_json_with_retries(&policy, "Bedrock API", || {
            // Fresh signature per attempt.
            let headers = self.sign_request("POST", &uri, &payload)?;
            let mut request = client.post(&endpoint);
            for (k, v) in &headers {
                request = request.header(k.as_str(), v.as_str());
            }
            Ok(request.body(payload.clone()))
        })
        .await?;

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

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(pairs: &[(&str, Value)]) -> LlmMessage {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn converse_uri_encodes_colons() {
        let provider =
            BedrockProvider::new("anthropic.claude-sonnet-4-20250514-v1:0", None, None);
        let uri = provider.converse_uri();
        assert!(uri.starts_with("/model/"));
        assert!(uri.contains("%3A"));
        assert!(!uri.trim_start_matches("/model/").contains(':'));
    }

    #[test]
    fn endpoint_tracks_region() {
        let provider = BedrockProvider::new(
            "amazon.nova-pro-v1:0",
            Some("eu-west-1".to_string()),
            None,
        );
        assert_eq!(provider.host(), "bedrock-runtime.eu-west-1.amazonaws.com");
    }

    #[test]
    fn inference_config_defaults_max_tokens() {
        let provider = BedrockProvider::new("amazon.nova-lite-v1:0", None, None);
        let messages = vec![msg(&[
            ("role", serde_json::json!("user")),
            ("content", serde_json::json!("hello")),
        ])];
        let body = provider.build_request_body(&messages, None);
        assert_eq!(body["inferenceConfig"]["maxTokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn tools_map_to_tool_specs() {
        let provider = BedrockProvider::new("amazon.nova-lite-v1:0", None, None);
        let tools = vec![serde_json::json!({
            "type": "function",
            "function": {
                "name": "get_weather",
                "description": "Weather lookup",
                "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
            }
        })];
        let messages = vec![msg(&[
            ("role", serde_json::json!("user")),
            ("content", serde_json::json!("weather?")),
        ])];
        let body = provider.build_request_body(&messages, Some(&tools));
        let spec = &body["toolConfig"]["tools"][0]["toolSpec"];
        assert_eq!(spec["name"], "get_weather");
        assert!(spec["inputSchema"]["json"]["properties"].get("city").is_some());
    }

    #[test]
    fn tool_use_blocks_become_canonical_calls() {
        let provider = BedrockProvider::new("amazon.nova-lite-v1:0", None, None);
        let response = serde_json::json!({
            "output": {"message": {"role": "assistant", "content": [
                {"toolUse": {"toolUseId": "tc_9", "name": "get_weather", "input": {"city": "NYC"}}}
            ]}},
            "stopReason": "tool_use"
        });
        let parsed = provider.parse_response(&response).unwrap();
        assert_eq!(parsed["tool_calls"][0]["id"], "tc_9");
        assert_eq!(parsed["tool_calls"][0]["function"]["name"], "get_weather");
    }

    #[test]
    fn sigv4_primitives() {
        assert_eq!(
            sigv4::sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(
            sigv4::signing_key("secret", "20240101", "us-east-1", "bedrock").len(),
            32
        );
    }

    #[test]
    fn signed_headers_are_sorted_lowercase() {
        let mut provider = BedrockProvider::new("amazon.nova-lite-v1:0", None, None);
        provider.aws_access_key_id = Some("AKIATEST".into());
        provider.aws_secret_access_key = Some("secret".into());
        provider.aws_session_token = Some("token".into());

        let headers = provider.sign_request("POST", "/model/m/converse", b"{}").unwrap();
        let auth = headers
            .iter()
            .find(|(k, _)| k == "Authorization")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert!(auth.contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token"));
        assert!(headers.iter().any(|(k, _)| k == "X-Amz-Security-Token"));
    }

    #[test]
    fn usage_extraction() {
        let response = serde_json::json!({
            "usage": {"inputTokens": 100, "outputTokens": 50, "totalTokens": 150}
        });
        let usage = BedrockProvider::extract_usage(&response);
        assert_eq!(usage["prompt_tokens"], 100);
        assert_eq!(usage["completion_tokens"], 50);
    }
}
