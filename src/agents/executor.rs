//! The agent execution loop.
//!
//! Drives a provider through thought → action → observation cycles until a
//! final answer, in one of two modes:
//!
//! - **Native tool calls**: the provider gets tool schemas and returns an
//!   assistant message with canonical `tool_calls`; results go back as
//!   `tool` role messages with matching `tool_call_id`s.
//! - **ReAct**: tool definitions live in the prompt, the model emits
//!   `Action:` text parsed by [`crate::agents::parser`], and observations
//!   go back as user messages. Stop words (`Observation:`) truncate the
//!   model's output before parsing.
//!
//! Parse failures retry with a correction hint up to `max_retry_limit`;
//! guardrail rejections re-prompt with feedback up to
//! `guardrail_max_retries`; a tool result flagged `result_as_answer`
//! short-circuits the loop. Every transition is mirrored onto the event
//! bus.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::errors::TroupeError;
use crate::events::bus::EventBus;
use crate::events::types::llm_events::{
    LlmCallCompletedEvent, LlmCallFailedEvent, LlmCallKind, LlmCallStartedEvent,
};
use crate::events::types::llm_guardrail_events::{
    LlmGuardrailCompletedEvent, LlmGuardrailStartedEvent,
};
use crate::events::types::logging_events::AgentLogsExecutionEvent;
use crate::events::types::tool_events::{
    ToolSelectionErrorEvent, ToolUsageErrorEvent, ToolUsageFinishedEvent, ToolUsageStartedEvent,
    ToolValidateInputErrorEvent,
};
use crate::agents::parser::{parse_react, ParsedStep};
use crate::llms::base::{new_call_id, LlmMessage, LlmProvider};
use crate::tasks::guardrail::Guardrail;
use crate::tools::{ToolCache, ToolRegistry};
use crate::types::usage_metrics::UsageMetrics;
use crate::utilities::prompts::AssembledPrompt;
use crate::utilities::rpm::RpmController;

/// Default iteration bound.
pub const DEFAULT_MAX_ITER: u32 = 25;
/// Default parse-retry budget.
pub const DEFAULT_MAX_RETRY_LIMIT: i32 = 2;
/// Rough bytes-per-token factor for context budgeting.
const CHARS_PER_TOKEN: usize = 4;

/// What a finished loop hands back.
#[derive(Debug, Clone)]
pub struct ExecutorResult {
    /// The accepted final answer.
    pub output: String,
    /// The full conversation, for transcripts.
    pub messages: Vec<LlmMessage>,
    /// Tool invocations that ran.
    pub used_tools: i32,
    /// Tool invocations that errored.
    pub tools_errors: i32,
    /// Provider usage accumulated over the run.
    pub usage: UsageMetrics,
}

/// One execution loop. Built fresh per task execution; not reusable.
pub struct AgentExecutor {
    provider: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
    /// Cache shared across iterations when the agent has caching on.
    pub cache: Option<Arc<ToolCache>>,
    /// RPM gate applied before every provider call.
    pub rpm: Option<Arc<RpmController>>,
    /// Guardrails run against each candidate final answer.
    pub guardrails: Vec<Guardrail>,
    /// Re-prompt budget for guardrail rejections.
    pub guardrail_max_retries: i32,
    /// Iteration bound.
    pub max_iter: u32,
    /// Parse-failure retry budget.
    pub max_retry_limit: i32,
    /// Native tool calls vs ReAct.
    pub use_native_tools: bool,
    /// Trim old messages when the conversation outgrows the window.
    pub respect_context_window: bool,
    /// Emit per-step logging events.
    pub verbose: bool,

    agent_role: String,
    source: Arc<dyn Any + Send + Sync>,
    messages: Vec<LlmMessage>,
    iterations: u32,
    used_tools: i32,
    tools_errors: i32,
    usage_at_start: UsageMetrics,
}

impl AgentExecutor {
    /// New executor around a provider and a tool set.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: ToolRegistry,
        agent_role: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        let use_native_tools = provider.supports_function_calling() && !tools.is_empty();
        let agent_id = agent_id.into();
        Self {
            provider,
            tools,
            cache: None,
            rpm: None,
            guardrails: Vec::new(),
            guardrail_max_retries: 3,
            max_iter: DEFAULT_MAX_ITER,
            max_retry_limit: DEFAULT_MAX_RETRY_LIMIT,
            use_native_tools,
            respect_context_window: true,
            verbose: false,
            agent_role: agent_role.into(),
            source: Arc::new(agent_id),
            messages: Vec::new(),
            iterations: 0,
            used_tools: 0,
            tools_errors: 0,
            usage_at_start: UsageMetrics::new(),
        }
    }

    fn push_message(&mut self, role: &str, content: &str) {
        let mut msg = HashMap::new();
        msg.insert("role".to_string(), Value::String(role.to_string()));
        msg.insert("content".to_string(), Value::String(content.to_string()));
        self.messages.push(msg);
    }

    /// Run the loop until a guarded final answer or a terminal error.
    pub fn invoke(&mut self, prompt: AssembledPrompt) -> Result<ExecutorResult, TroupeError> {
        self.messages.clear();
        self.iterations = 0;
        // Providers can be shared across runs; usage for this run is the
        // delta against the snapshot taken here.
        self.usage_at_start = self.provider.get_token_usage_summary();
        self.push_message("system", &prompt.system);
        self.push_message("user", &prompt.user);

        let mut parse_retries: i32 = 0;
        let mut guardrail_retries: i32 = 0;

        loop {
            if self.iterations >= self.max_iter {
                return Err(TroupeError::AgentExecution(format!(
                    "agent '{}' exceeded maximum iterations ({}) without a final answer",
                    self.agent_role, self.max_iter
                )));
            }
            self.iterations += 1;

            let response = self.call_provider()?;

            // Native path: the provider returned an assistant message with
            // canonical tool calls.
            if let Some(tool_calls) = response
                .as_object()
                .and_then(|obj| obj.get("tool_calls"))
                .and_then(Value::as_array)
                .cloned()
            {
                self.messages.push(assistant_message_from(&response));
                if let Some(answer) = self.run_native_tool_calls(&tool_calls)? {
                    // A result_as_answer tool ends the loop with its output.
                    match self.run_guardrails(answer, &mut guardrail_retries)? {
                        Some(accepted) => return Ok(self.finish(accepted)),
                        None => continue,
                    }
                }
                continue;
            }

            let text = match &response {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };

            if self.verbose {
                let mut event =
                    AgentLogsExecutionEvent::new(self.agent_role.clone(), text.clone(), true);
                EventBus::global().emit(self.source.clone(), &mut event);
            }

            // ReAct path (also handles native-mode text responses, which
            // are final answers by definition).
            if self.use_native_tools {
                match self.run_guardrails(text, &mut guardrail_retries)? {
                    Some(accepted) => return Ok(self.finish(accepted)),
                    None => continue,
                }
            }

            match parse_react(&text) {
                Ok(ParsedStep::Finish(finish)) => {
                    let answer = match finish.output {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    match self.run_guardrails(answer, &mut guardrail_retries)? {
                        Some(accepted) => return Ok(self.finish(accepted)),
                        None => continue,
                    }
                }
                Ok(ParsedStep::Action(action)) => {
                    self.push_message("assistant", &text);
                    let (observation, result_as_answer) =
                        self.execute_tool(&action.tool, &action.tool_input);
                    if result_as_answer {
                        match self.run_guardrails(observation, &mut guardrail_retries)? {
                            Some(accepted) => return Ok(self.finish(accepted)),
                            None => continue,
                        }
                    }
                    self.push_message("user", &format!("Observation: {}", observation));
                }
                Err(parse_error) => {
                    parse_retries += 1;
                    if parse_retries > self.max_retry_limit {
                        return Err(TroupeError::AgentExecution(format!(
                            "agent '{}' output could not be parsed after {} retries: {}",
                            self.agent_role, self.max_retry_limit, parse_error
                        )));
                    }
                    self.push_message("assistant", &text);
                    self.push_message("user", &parse_error.error);
                }
            }
        }
    }

    /// One provider call with RPM gating, window trimming, and events.
    fn call_provider(&mut self) -> Result<Value, TroupeError> {
        if let Some(ref rpm) = self.rpm {
            rpm.check_or_wait();
        }
        self.enforce_context_window();

        let tools = if self.use_native_tools {
            Some(self.tools.to_schemas())
        } else {
            None
        };
        let call_id = new_call_id();
        let mut started = LlmCallStartedEvent::new(
            self.provider.model().to_string(),
            self.messages.len(),
            tools
                .as_ref()
                .map(|t| t.iter().filter_map(tool_schema_name).collect()),
            call_id.clone(),
        );
        EventBus::global().emit(self.source.clone(), &mut started);

        match self.provider.call(self.messages.clone(), tools, None) {
            Ok(response) => {
                let kind = if response.get("tool_calls").is_some() {
                    LlmCallKind::ToolCall
                } else {
                    LlmCallKind::Completion
                };
                let mut completed = LlmCallCompletedEvent::new(
                    self.provider.model().to_string(),
                    kind,
                    response.clone(),
                    call_id,
                );
                EventBus::global().emit(self.source.clone(), &mut completed);
                Ok(response)
            }
            Err(error) => {
                let mut failed = LlmCallFailedEvent::new(
                    self.provider.model().to_string(),
                    error.to_string(),
                    call_id,
                );
                EventBus::global().emit(self.source.clone(), &mut failed);
                Err(TroupeError::AgentExecution(format!(
                    "LLM call failed for agent '{}': {}",
                    self.agent_role, error
                )))
            }
        }
    }

    /// Run every requested native tool call, appending `tool` role results.
    /// Returns `Some(answer)` when a `result_as_answer` tool fired.
    fn run_native_tool_calls(
        &mut self,
        tool_calls: &[Value],
    ) -> Result<Option<String>, TroupeError> {
        let mut short_circuit: Option<String> = None;

        for call in tool_calls {
            let call_id = call
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let name = call
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let arguments = call
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(Value::as_str)
                .unwrap_or("{}");

            let (observation, result_as_answer) = self.execute_tool(&name, arguments);

            let mut msg = HashMap::new();
            msg.insert("role".to_string(), Value::String("tool".to_string()));
            msg.insert("tool_call_id".to_string(), Value::String(call_id));
            msg.insert("name".to_string(), Value::String(name));
            msg.insert("content".to_string(), Value::String(observation.clone()));
            self.messages.push(msg);

            if result_as_answer && short_circuit.is_none() {
                short_circuit = Some(observation);
            }
        }

        Ok(short_circuit)
    }

    /// Resolve and invoke one tool. Errors become observations, never
    /// terminal failures. Returns `(observation, result_as_answer)`.
    fn execute_tool(&mut self, name: &str, raw_args: &str) -> (String, bool) {
        let bus = EventBus::global();

        let tool = match self.tools.get(name) {
            Some(tool) => tool,
            None => {
                let mut event =
                    ToolSelectionErrorEvent::new(name.to_string(), self.tools.names());
                bus.emit(self.source.clone(), &mut event);
                self.tools_errors += 1;
                return (
                    format!(
                        "Tool '{}' does not exist. Available tools: {}",
                        name,
                        self.tools.names().join(", ")
                    ),
                    false,
                );
            }
        };

        // Arguments should be JSON. Anything else is reported, then fed
        // to the tool under a conventional key so simple tools still run.
        let trimmed = raw_args.trim();
        let args = if trimmed.is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => value,
                Err(error) => {
                    let mut event = ToolValidateInputErrorEvent::new(
                        tool.name().to_string(),
                        format!("tool arguments were not valid JSON: {error}"),
                    );
                    bus.emit(self.source.clone(), &mut event);
                    serde_json::json!({ "input": trimmed })
                }
            }
        };

        // The usage scope opens before the cache check so cache hits still
        // emit a balanced started/finished pair.
        let started_at = Utc::now();
        let mut started = ToolUsageStartedEvent::new(tool.name().to_string(), args.clone(), 1);
        bus.emit(self.source.clone(), &mut started);

        let cache_key = args.to_string();
        if tool.cacheable() {
            if let Some(cached) = self
                .cache
                .as_ref()
                .and_then(|c| c.read(tool.name(), &cache_key))
            {
                let mut event = ToolUsageFinishedEvent::new(
                    tool.name().to_string(),
                    cached.clone(),
                    true,
                    started_at,
                );
                bus.emit(self.source.clone(), &mut event);
                self.used_tools += 1;
                return (cached, tool.result_as_answer());
            }
        }

        // A panicking tool must not tear down the loop; it becomes an
        // error observation like any other tool failure.
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| tool.run(&args)));

        match outcome {
            Ok(Ok(output)) => {
                self.used_tools += 1;
                if tool.cacheable() {
                    if let Some(ref cache) = self.cache {
                        cache.add(tool.name(), &cache_key, &output);
                    }
                }
                let mut finished = ToolUsageFinishedEvent::new(
                    tool.name().to_string(),
                    output.clone(),
                    false,
                    started_at,
                );
                bus.emit(self.source.clone(), &mut finished);
                (output, tool.result_as_answer())
            }
            Ok(Err(error)) => {
                self.tools_errors += 1;
                let mut failed =
                    ToolUsageErrorEvent::new(tool.name().to_string(), error.to_string(), 1);
                bus.emit(self.source.clone(), &mut failed);
                (format!("Tool '{}' failed: {}", tool.name(), error), false)
            }
            Err(panic) => {
                self.tools_errors += 1;
                let message = panic_message(panic);
                log::error!("tool '{}' panicked: {}", tool.name(), message);
                let mut failed =
                    ToolUsageErrorEvent::new(tool.name().to_string(), message.clone(), 1);
                bus.emit(self.source.clone(), &mut failed);
                (format!("Tool '{}' crashed: {}", tool.name(), message), false)
            }
        }
    }

    /// Evaluate every guardrail against a candidate answer. `Ok(Some)` is
    /// acceptance; `Ok(None)` means a rejection was fed back and the loop
    /// should call the model again.
    fn run_guardrails(
        &mut self,
        answer: String,
        guardrail_retries: &mut i32,
    ) -> Result<Option<String>, TroupeError> {
        if self.guardrails.is_empty() {
            return Ok(Some(answer));
        }
        let bus = EventBus::global();

        for guardrail in self.guardrails.clone() {
            let mut started = LlmGuardrailStartedEvent::new(
                guardrail.describe().to_string(),
                *guardrail_retries,
            );
            bus.emit(self.source.clone(), &mut started);

            let verdict = match guardrail.evaluate(&answer) {
                Ok(verdict) => verdict,
                Err(error) => {
                    let mut completed = LlmGuardrailCompletedEvent::new(
                        false,
                        String::new(),
                        Some(error.to_string()),
                        *guardrail_retries,
                    );
                    bus.emit(self.source.clone(), &mut completed);
                    return Err(error);
                }
            };

            let mut completed = LlmGuardrailCompletedEvent::new(
                verdict.passed,
                if verdict.passed {
                    answer.clone()
                } else {
                    verdict.feedback.clone().unwrap_or_default()
                },
                None,
                *guardrail_retries,
            );
            bus.emit(self.source.clone(), &mut completed);

            if !verdict.passed {
                *guardrail_retries += 1;
                if *guardrail_retries > self.guardrail_max_retries {
                    return Err(TroupeError::Guardrail(format!(
                        "output still rejected after {} retries: {}",
                        self.guardrail_max_retries,
                        verdict.feedback.unwrap_or_default()
                    )));
                }
                let feedback = verdict.feedback.unwrap_or_default();
                self.push_message("assistant", &answer);
                self.push_message(
                    "user",
                    &format!(
                        "Your answer was rejected: {}\nRework your answer and respond again in the required format.",
                        feedback
                    ),
                );
                return Ok(None);
            }
        }

        Ok(Some(answer))
    }

    /// Keep the conversation inside the usable window by dropping the
    /// oldest non-system messages. Chars approximate tokens.
    fn enforce_context_window(&mut self) {
        if !self.respect_context_window {
            return;
        }
        let budget =
            (self.provider.get_context_window_size() as f64 * 0.85) as usize * CHARS_PER_TOKEN;
        let size = |messages: &[LlmMessage]| -> usize {
            messages
                .iter()
                .filter_map(|m| m.get("content").and_then(Value::as_str))
                .map(str::len)
                .sum()
        };
        if size(&self.messages) <= budget {
            return;
        }
        log::warn!(
            "conversation exceeds the usable context window; dropping oldest messages"
        );
        // Index 0 is the system prompt; always keep it and the last
        // exchange.
        while size(&self.messages) > budget && self.messages.len() > 3 {
            self.messages.remove(1);
        }
    }

    fn finish(&mut self, output: String) -> ExecutorResult {
        self.push_message("assistant", &output);
        let usage = usage_since(&self.usage_at_start, &self.provider.get_token_usage_summary());
        ExecutorResult {
            output,
            messages: std::mem::take(&mut self.messages),
            used_tools: self.used_tools,
            tools_errors: self.tools_errors,
            usage,
        }
    }
}

/// Counter delta between two usage snapshots of the same provider.
fn usage_since(start: &UsageMetrics, end: &UsageMetrics) -> UsageMetrics {
    UsageMetrics {
        total_tokens: end.total_tokens - start.total_tokens,
        prompt_tokens: end.prompt_tokens - start.prompt_tokens,
        cached_prompt_tokens: end.cached_prompt_tokens - start.cached_prompt_tokens,
        completion_tokens: end.completion_tokens - start.completion_tokens,
        successful_requests: end.successful_requests - start.successful_requests,
    }
}

/// Copy the canonical assistant message (content + tool_calls) into the
/// conversation history.
fn assistant_message_from(response: &Value) -> LlmMessage {
    let mut msg = HashMap::new();
    msg.insert("role".to_string(), Value::String("assistant".to_string()));
    msg.insert(
        "content".to_string(),
        response.get("content").cloned().unwrap_or(Value::Null),
    );
    if let Some(tool_calls) = response.get("tool_calls") {
        msg.insert("tool_calls".to_string(), tool_calls.clone());
    }
    msg
}

fn tool_schema_name(schema: &Value) -> Option<String> {
    schema
        .get("function")
        .and_then(|f| f.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llms::providers::MockProvider;
    use crate::tasks::guardrail::GuardrailVerdict;
    use crate::tools::FunctionTool;
    use crate::utilities::prompts::AssembledPrompt;

    fn prompt() -> AssembledPrompt {
        AssembledPrompt {
            system: "You are a test agent.".into(),
            user: "Do the thing.".into(),
        }
    }

    fn executor_with(provider: MockProvider, tools: ToolRegistry) -> AgentExecutor {
        let mut executor =
            AgentExecutor::new(Arc::new(provider), tools, "tester", "agent-1");
        executor.respect_context_window = false;
        executor
    }

    #[test]
    fn react_final_answer_returns_immediately() {
        let _ = env_logger::builder().is_test(true).try_init();
        let provider = MockProvider::new(vec!["Thought: done\nFinal Answer: all good"]);
        let mut executor = executor_with(provider, ToolRegistry::new());
        executor.use_native_tools = false;

        let result = executor.invoke(prompt()).unwrap();
        assert_eq!(result.output, "all good");
        assert_eq!(result.used_tools, 0);
        assert_eq!(result.usage.successful_requests, 1);
    }

    #[test]
    fn react_action_feeds_observation_back() {
        let provider = MockProvider::new(vec![
            "Thought: look it up\nAction: lookup\nAction Input: {\"key\": \"x\"}",
            "Thought: got it\nFinal Answer: value is 42",
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(FunctionTool::new("lookup", "find values", |args| {
            assert_eq!(args["key"], "x");
            Ok("42".into())
        })));
        let mut executor = executor_with(provider, tools);
        executor.use_native_tools = false;

        let result = executor.invoke(prompt()).unwrap();
        assert_eq!(result.output, "value is 42");
        assert_eq!(result.used_tools, 1);
        // The observation was appended as a user message.
        assert!(result.messages.iter().any(|m| {
            m.get("content")
                .and_then(Value::as_str)
                .is_some_and(|c| c.starts_with("Observation: 42"))
        }));
    }

    #[test]
    fn native_tool_calls_round_trip_with_matching_ids() {
        let provider = MockProvider::with_values(vec![
            MockProvider::tool_call_response("call_7", "lookup", serde_json::json!({"key": "x"})),
            Value::String("final answer from tools".into()),
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(FunctionTool::new("lookup", "find values", |_| {
            Ok("42".into())
        })));
        let mut executor = executor_with(provider, tools);
        assert!(executor.use_native_tools);

        let result = executor.invoke(prompt()).unwrap();
        assert_eq!(result.output, "final answer from tools");
        let tool_message = result
            .messages
            .iter()
            .find(|m| m.get("role").and_then(Value::as_str) == Some("tool"))
            .expect("tool message present");
        assert_eq!(
            tool_message.get("tool_call_id").and_then(Value::as_str),
            Some("call_7")
        );
    }

    #[test]
    fn result_as_answer_short_circuits_without_another_call() {
        let provider = MockProvider::with_values(vec![MockProvider::tool_call_response(
            "call_1",
            "fetch",
            serde_json::json!({}),
        )]);
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(
            FunctionTool::new("fetch", "fetches", |_| Ok("the raw payload".into()))
                .with_result_as_answer(true),
        ));
        let mut executor = executor_with(provider, tools);

        let result = executor.invoke(prompt()).unwrap();
        assert_eq!(result.output, "the raw payload");
        assert_eq!(result.usage.successful_requests, 1);
    }

    #[test]
    fn tool_errors_become_observations_and_count() {
        let provider = MockProvider::new(vec![
            "Thought: t\nAction: broken\nAction Input: {}",
            "Thought: ok\nFinal Answer: recovered",
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(FunctionTool::new("broken", "always fails", |_| {
            Err(TroupeError::Tool {
                name: "broken".into(),
                message: "boom".into(),
            })
        })));
        let mut executor = executor_with(provider, tools);
        executor.use_native_tools = false;

        let result = executor.invoke(prompt()).unwrap();
        assert_eq!(result.output, "recovered");
        assert_eq!(result.tools_errors, 1);
    }

    #[test]
    fn panicking_tool_is_caught() {
        let provider = MockProvider::new(vec![
            "Thought: t\nAction: crashy\nAction Input: {}",
            "Thought: ok\nFinal Answer: survived",
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(FunctionTool::new("crashy", "panics", |_| {
            panic!("tool blew up")
        })));
        let mut executor = executor_with(provider, tools);
        executor.use_native_tools = false;

        let result = executor.invoke(prompt()).unwrap();
        assert_eq!(result.output, "survived");
        assert_eq!(result.tools_errors, 1);
    }

    #[test]
    fn unknown_tool_lists_available_ones() {
        let provider = MockProvider::new(vec![
            "Thought: t\nAction: ghost\nAction Input: {}",
            "Thought: ok\nFinal Answer: fine",
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(FunctionTool::new("real", "exists", |_| Ok("x".into()))));
        let mut executor = executor_with(provider, tools);
        executor.use_native_tools = false;

        let result = executor.invoke(prompt()).unwrap();
        assert!(result.messages.iter().any(|m| {
            m.get("content")
                .and_then(Value::as_str)
                .is_some_and(|c| c.contains("does not exist") && c.contains("real"))
        }));
    }

    #[test]
    fn parse_failures_retry_with_a_hint_then_surface() {
        // Three malformed responses against a retry budget of 2.
        let provider = MockProvider::new(vec!["gibberish", "more gibberish", "still bad"]);
        let mut executor = executor_with(provider, ToolRegistry::new());
        executor.use_native_tools = false;
        executor.max_retry_limit = 2;

        let result = executor.invoke(prompt());
        assert!(matches!(result, Err(TroupeError::AgentExecution(_))));
    }

    #[test]
    fn guardrail_rejection_reprompts_then_accepts() {
        let provider = MockProvider::new(vec![
            "Thought: t\nFinal Answer: almost",
            "Thought: t\nFinal Answer: final answer",
        ]);
        let mut executor = executor_with(provider, ToolRegistry::new());
        executor.use_native_tools = false;
        executor.guardrail_max_retries = 2;
        executor.guardrails = vec![Guardrail::function("must contain 'final'", |output| {
            if output.contains("final") {
                GuardrailVerdict::pass()
            } else {
                GuardrailVerdict::fail("output must contain the word 'final'")
            }
        })];

        let result = executor.invoke(prompt()).unwrap();
        assert!(result.output.contains("final"));
        assert_eq!(result.usage.successful_requests, 2);
    }

    #[test]
    fn guardrail_budget_exhaustion_surfaces() {
        let provider = MockProvider::new(vec!["Thought: t\nFinal Answer: nope"]);
        let mut executor = executor_with(provider, ToolRegistry::new());
        executor.use_native_tools = false;
        executor.guardrail_max_retries = 1;
        executor.guardrails = vec![Guardrail::function("always rejects", |_| {
            GuardrailVerdict::fail("never good enough")
        })];

        let result = executor.invoke(prompt());
        assert!(matches!(result, Err(TroupeError::Guardrail(_))));
    }

    #[test]
    fn max_iter_one_makes_at_most_one_call() {
        // The single response asks for a tool, which would need a second
        // call to resolve; the loop must stop with a bounded error.
        let provider = MockProvider::new(vec!["Thought: t\nAction: real\nAction Input: {}"]);
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(FunctionTool::new("real", "exists", |_| Ok("x".into()))));
        let mut executor = executor_with(provider, tools);
        executor.use_native_tools = false;
        executor.max_iter = 1;

        let result = executor.invoke(prompt());
        assert!(matches!(result, Err(TroupeError::AgentExecution(_))));
    }

    #[test]
    fn cached_tool_results_skip_execution() {
        let provider = MockProvider::new(vec![
            "Thought: a\nAction: lookup\nAction Input: {\"k\": 1}",
            "Thought: b\nAction: lookup\nAction Input: {\"k\": 1}",
            "Thought: c\nFinal Answer: done",
        ]);
        let runs = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let runs_in_tool = runs.clone();
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(FunctionTool::new("lookup", "find", move |_| {
            runs_in_tool.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok("42".into())
        })));
        let mut executor = executor_with(provider, tools);
        executor.use_native_tools = false;
        executor.cache = Some(Arc::new(ToolCache::new()));

        let result = executor.invoke(prompt()).unwrap();
        assert_eq!(result.output, "done");
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(result.used_tools, 2);
    }
}
