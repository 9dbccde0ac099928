//! The top-level LLM configuration and provider router.
//!
//! An [`Llm`] is what agents and crews hold: a model identifier plus call
//! parameters. At call time it resolves a provider — explicit override,
//! then the `provider/` prefix of the model string, then model-name
//! patterns, defaulting to OpenAI — instantiates the native integration,
//! and forwards the canonical call.

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TroupeError;
use crate::llms::base::{LlmMessage, LlmProvider};
use crate::llms::providers::{
    AnthropicProvider, AzureProvider, BedrockProvider, GeminiProvider, OpenAiProvider, XaiProvider,
};

/// Floor for context-window overrides.
pub const MIN_CONTEXT: usize = 1024;
/// Ceiling for context-window overrides (gemini-1.5-pro).
pub const MAX_CONTEXT: usize = 2_097_152;
/// Window assumed for unknown models.
pub const DEFAULT_CONTEXT_WINDOW_SIZE: usize = 8192;
/// Fraction of the window callers may actually fill.
pub const CONTEXT_WINDOW_USAGE_RATIO: f64 = 0.85;

lazy_static! {
    /// Known context windows by model identifier.
    pub static ref CONTEXT_WINDOW_SIZES: HashMap<&'static str, usize> = {
        let mut m = HashMap::new();
        // OpenAI
        m.insert("gpt-4", 8_192);
        m.insert("gpt-4o", 128_000);
        m.insert("gpt-4o-mini", 200_000);
        m.insert("gpt-4-turbo", 128_000);
        m.insert("gpt-4.1", 1_047_576);
        m.insert("o1-mini", 128_000);
        m.insert("o1-preview", 128_000);
        m.insert("o3-mini", 200_000);
        m.insert("o4-mini", 200_000);
        // Anthropic
        m.insert("claude-3-5-sonnet-20241022", 200_000);
        m.insert("claude-sonnet-4-20250514", 200_000);
        m.insert("claude-opus-4-20250514", 200_000);
        m.insert("claude-3-5-haiku-20241022", 200_000);
        // Gemini
        m.insert("gemini-2.0-flash", 1_048_576);
        m.insert("gemini-2.0-flash-001", 1_048_576);
        m.insert("gemini-2.5-pro", 1_048_576);
        m.insert("gemini-1.5-pro", 2_097_152);
        m.insert("gemini-1.5-flash", 1_048_576);
        m.insert("gemma-3-27b-it", 128_000);
        // Bedrock
        m.insert("amazon.nova-pro-v1:0", 300_000);
        m.insert("amazon.nova-lite-v1:0", 300_000);
        m.insert("amazon.nova-micro-v1:0", 128_000);
        m.insert("anthropic.claude-3-5-sonnet-20241022-v2:0", 200_000);
        m.insert("us.anthropic.claude-sonnet-4-20250514-v1:0", 200_000);
        m.insert("meta.llama3-1-70b-instruct-v1:0", 128_000);
        m.insert("meta.llama3-1-8b-instruct-v1:0", 128_000);
        m.insert("mistral.mistral-7b-instruct-v0:2", 32_000);
        m.insert("ai21.jamba-instruct-v1:0", 256_000);
        // xAI
        m.insert("grok-3", 131_072);
        m.insert("grok-3-mini", 131_072);
        m.insert("grok-2-vision", 32_768);
        m
    };
}

/// Effort knob for reasoning models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    None,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReasoningEffort::None => "none",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        };
        write!(f, "{name}")
    }
}

/// LLM configuration carried by agents and crews. Cheap to clone; the
/// provider instance is built per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Llm {
    /// Model identifier, optionally provider-prefixed
    /// (`"openai/gpt-4o"`, `"claude-sonnet-4-20250514"`).
    pub model: String,
    /// Explicit provider override.
    pub provider: Option<String>,
    /// Request timeout in seconds.
    pub timeout: Option<f64>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Nucleus sampling.
    pub top_p: Option<f64>,
    /// Stop sequences.
    pub stop: Vec<String>,
    /// Completion token cap.
    pub max_tokens: Option<u32>,
    /// Presence penalty (-2..=2).
    pub presence_penalty: Option<f64>,
    /// Frequency penalty (-2..=2).
    pub frequency_penalty: Option<f64>,
    /// Structured-output configuration.
    pub response_format: Option<Value>,
    /// Seed for reproducible sampling.
    pub seed: Option<i64>,
    /// Base URL / endpoint override.
    pub base_url: Option<String>,
    /// API version (Azure).
    pub api_version: Option<String>,
    /// API key override; providers fall back to their env vars.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Effort knob for reasoning models.
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Whether streaming is requested where supported.
    pub stream: bool,
    /// Context-window override; 0 means "use the lookup table".
    pub context_window_size: usize,
    /// Extra provider-specific parameters, passed through opaquely.
    pub additional_params: HashMap<String, Value>,
}

impl Llm {
    /// Configuration for `model` with defaults everywhere else.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            provider: None,
            timeout: None,
            temperature: None,
            top_p: None,
            stop: Vec::new(),
            max_tokens: None,
            presence_penalty: None,
            frequency_penalty: None,
            response_format: None,
            seed: None,
            base_url: None,
            api_version: None,
            api_key: None,
            reasoning_effort: None,
            stream: false,
            context_window_size: 0,
            additional_params: HashMap::new(),
        }
    }

    /// Configuration with an explicit provider override.
    pub fn with_provider(model: impl Into<String>, provider: impl Into<String>) -> Self {
        let mut llm = Self::new(model);
        llm.provider = Some(provider.into());
        llm
    }

    // -- builder setters ----------------------------------------------------

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn timeout(mut self, timeout: f64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    // -- provider resolution ------------------------------------------------

    /// Resolve the provider name: explicit override, `provider/` prefix,
    /// model-name pattern, then the OpenAI default.
    pub fn infer_provider(&self) -> String {
        if let Some(ref provider) = self.provider {
            return provider.clone();
        }

        let model = self.model.to_lowercase();
        if let Some((prefix, _)) = model.split_once('/') {
            match prefix {
                "openai" => return "openai".into(),
                "anthropic" | "claude" => return "anthropic".into(),
                "azure" | "azure_openai" => return "azure".into(),
                "google" | "gemini" => return "gemini".into(),
                "bedrock" | "aws" => return "bedrock".into(),
                "xai" | "grok" => return "xai".into(),
                _ => {}
            }
        }

        if model.starts_with("gpt-")
            || model.starts_with("o1")
            || model.starts_with("o3")
            || model.starts_with("o4")
        {
            return "openai".into();
        }
        if model.starts_with("claude-") {
            return "anthropic".into();
        }
        if model.starts_with("gemini-") || model.starts_with("gemma-") {
            return "gemini".into();
        }
        if model.starts_with("grok-") {
            return "xai".into();
        }

        "openai".into()
    }

    /// The model identifier with any provider prefix removed.
    pub fn bare_model(&self) -> &str {
        match self.model.split_once('/') {
            Some((prefix, rest))
                if matches!(
                    prefix,
                    "openai"
                        | "anthropic"
                        | "claude"
                        | "azure"
                        | "azure_openai"
                        | "google"
                        | "gemini"
                        | "bedrock"
                        | "aws"
                        | "xai"
                        | "grok"
                ) =>
            {
                rest
            }
            _ => &self.model,
        }
    }

    /// Instantiate the native provider this configuration resolves to.
    pub fn build_provider(&self) -> Result<Box<dyn LlmProvider>, TroupeError> {
        if self.model.is_empty() {
            return Err(TroupeError::config("model name cannot be empty"));
        }
        let model = self.bare_model().to_string();
        let provider = self.infer_provider();

        let effort = self.reasoning_effort.map(|e| e.to_string());
        let boxed: Box<dyn LlmProvider> = match provider.as_str() {
            "anthropic" => {
                let mut p =
                    AnthropicProvider::new(model, self.api_key.clone(), self.base_url.clone());
                p.state.temperature = self.temperature;
                p.state.stop = self.stop.clone();
                p.timeout = self.timeout;
                p.top_p = self.top_p;
                if let Some(max) = self.max_tokens {
                    p.max_tokens = max;
                }
                Box::new(p)
            }
            "gemini" => {
                let mut p = GeminiProvider::new(model, self.api_key.clone());
                p.state.temperature = self.temperature;
                p.state.stop = self.stop.clone();
                p.timeout = self.timeout;
                p.top_p = self.top_p;
                p.max_output_tokens = self.max_tokens;
                Box::new(p)
            }
            "bedrock" => {
                let mut p = BedrockProvider::new(model, None, None);
                p.state.temperature = self.temperature;
                p.state.stop = self.stop.clone();
                p.timeout = self.timeout;
                p.top_p = self.top_p;
                p.max_tokens = self.max_tokens;
                Box::new(p)
            }
            "azure" => {
                let mut p = AzureProvider::new(model, self.api_key.clone(), self.base_url.clone());
                p.state.temperature = self.temperature;
                p.state.stop = self.stop.clone();
                p.timeout = self.timeout;
                p.top_p = self.top_p;
                p.max_tokens = self.max_tokens;
                p.response_format = self.response_format.clone();
                if self.api_version.is_some() {
                    p.api_version = self.api_version.clone();
                }
                Box::new(p)
            }
            "xai" => {
                let mut p = XaiProvider::new(model, self.api_key.clone(), self.base_url.clone());
                p.state.temperature = self.temperature;
                p.state.stop = self.stop.clone();
                p.timeout = self.timeout;
                p.top_p = self.top_p;
                p.max_tokens = self.max_tokens;
                p.seed = self.seed;
                p.response_format = self.response_format.clone();
                p.reasoning_effort = effort;
                Box::new(p)
            }
            other => {
                if other != "openai" {
                    log::warn!("unknown provider '{}', using the OpenAI integration", other);
                }
                let mut p = OpenAiProvider::new(model, self.api_key.clone(), self.base_url.clone());
                p.state.temperature = self.temperature;
                p.state.stop = self.stop.clone();
                p.timeout = self.timeout;
                p.top_p = self.top_p;
                p.max_tokens = self.max_tokens;
                p.seed = self.seed;
                p.frequency_penalty = self.frequency_penalty;
                p.presence_penalty = self.presence_penalty;
                p.response_format = self.response_format.clone();
                p.reasoning_effort = effort;
                Box::new(p)
            }
        };
        Ok(boxed)
    }

    // -- calls --------------------------------------------------------------

    /// Route a synchronous call through the resolved provider. The return
    /// value keeps the canonical shape (text string or tool-call message).
    pub fn call(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<Value>>,
    ) -> Result<Value, TroupeError> {
        self.build_provider()?.call(messages, tools, None)
    }

    /// Async variant of [`call`](Self::call).
    pub async fn acall(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<Value>>,
    ) -> Result<Value, TroupeError> {
        self.build_provider()?.acall(messages, tools, None).await
    }

    // -- capabilities -------------------------------------------------------

    /// Whether the model family supports native tool calls.
    pub fn supports_function_calling(&self) -> bool {
        let model = self.model.to_lowercase();
        ["gpt-4", "gpt-3.5-turbo", "claude-", "gemini", "grok-", "o1", "o3", "o4", "llama-3", "mistral"]
            .iter()
            .any(|family| model.contains(family))
    }

    /// Context window: explicit override (clamped), then the lookup table
    /// (with and without provider prefix), then the default.
    pub fn get_context_window_size(&self) -> usize {
        if self.context_window_size > 0 {
            return self.context_window_size.clamp(MIN_CONTEXT, MAX_CONTEXT);
        }
        if let Some(&size) = CONTEXT_WINDOW_SIZES.get(self.model.as_str()) {
            return size;
        }
        if let Some(&size) = CONTEXT_WINDOW_SIZES.get(self.bare_model()) {
            return size;
        }
        DEFAULT_CONTEXT_WINDOW_SIZE
    }

    /// The portion of the window callers should actually fill.
    pub fn usable_context_window(&self) -> usize {
        (self.get_context_window_size() as f64 * CONTEXT_WINDOW_USAGE_RATIO) as usize
    }
}

impl std::fmt::Display for Llm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Llm(model={})", self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_from_prefix() {
        assert_eq!(Llm::new("openai/gpt-4o").infer_provider(), "openai");
        assert_eq!(Llm::new("anthropic/claude-x").infer_provider(), "anthropic");
        assert_eq!(Llm::new("azure/gpt-4").infer_provider(), "azure");
        assert_eq!(Llm::new("gemini/gemini-2.0-flash").infer_provider(), "gemini");
        assert_eq!(Llm::new("bedrock/amazon.nova-pro-v1:0").infer_provider(), "bedrock");
        assert_eq!(Llm::new("grok/grok-3").infer_provider(), "xai");
    }

    #[test]
    fn provider_from_model_pattern() {
        assert_eq!(Llm::new("gpt-4o").infer_provider(), "openai");
        assert_eq!(Llm::new("o3-mini").infer_provider(), "openai");
        assert_eq!(Llm::new("o4-mini").infer_provider(), "openai");
        assert_eq!(Llm::new("claude-sonnet-4-20250514").infer_provider(), "anthropic");
        assert_eq!(Llm::new("gemini-2.0-flash").infer_provider(), "gemini");
        assert_eq!(Llm::new("gemma-3-27b-it").infer_provider(), "gemini");
        assert_eq!(Llm::new("grok-3-mini").infer_provider(), "xai");
        assert_eq!(Llm::new("totally-unknown").infer_provider(), "openai");
    }

    #[test]
    fn explicit_provider_wins() {
        let llm = Llm::with_provider("custom-model", "bedrock");
        assert_eq!(llm.infer_provider(), "bedrock");
    }

    #[test]
    fn bare_model_strips_known_prefixes_only() {
        assert_eq!(Llm::new("openai/gpt-4o").bare_model(), "gpt-4o");
        assert_eq!(Llm::new("gpt-4o").bare_model(), "gpt-4o");
        // Unknown prefixes stay; some Bedrock ids contain slashes of their own.
        assert_eq!(Llm::new("weird/model").bare_model(), "weird/model");
    }

    #[test]
    fn context_window_lookup_and_clamp() {
        assert_eq!(Llm::new("gpt-4o").get_context_window_size(), 128_000);
        assert_eq!(Llm::new("openai/gpt-4o").get_context_window_size(), 128_000);
        assert_eq!(
            Llm::new("gemini-1.5-pro").get_context_window_size(),
            2_097_152
        );
        assert_eq!(
            Llm::new("never-heard-of-it").get_context_window_size(),
            DEFAULT_CONTEXT_WINDOW_SIZE
        );

        let mut llm = Llm::new("gpt-4");
        llm.context_window_size = 100;
        assert_eq!(llm.get_context_window_size(), MIN_CONTEXT);
        llm.context_window_size = usize::MAX;
        assert_eq!(llm.get_context_window_size(), MAX_CONTEXT);
    }

    #[test]
    fn usable_window_applies_ratio() {
        let llm = Llm::new("gpt-4o");
        assert_eq!(llm.usable_context_window(), (128_000f64 * 0.85) as usize);
    }

    #[test]
    fn build_provider_routes_by_inference() {
        let provider = Llm::new("claude-sonnet-4-20250514")
            .api_key("k")
            .build_provider()
            .unwrap();
        assert_eq!(provider.provider(), "anthropic");

        let provider = Llm::new("openai/gpt-4o").api_key("k").build_provider().unwrap();
        assert_eq!(provider.provider(), "openai");
        assert_eq!(provider.model(), "gpt-4o");

        assert!(matches!(
            Llm::new("").build_provider(),
            Err(TroupeError::Config(_))
        ));
    }

    #[test]
    fn builder_threads_parameters_into_the_provider() {
        let llm = Llm::new("gpt-4o")
            .api_key("k")
            .temperature(0.4)
            .max_tokens(256)
            .stop(vec!["Observation:".into()]);
        let provider = llm.build_provider().unwrap();
        assert_eq!(provider.temperature(), Some(0.4));
        assert_eq!(provider.stop(), ["Observation:".to_string()]);
    }
}
