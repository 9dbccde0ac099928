//! The agent: a persona triple bound to an LLM and a set of tools.
//!
//! `execute_task` is the crew-facing entry point: it assembles the task
//! prompt, runs the execution loop (optionally under a timeout), and
//! brackets the run with `agent_execution_*` events. `kickoff` is the
//! standalone entry point with lighter prompt scaffolding and
//! `lite_agent_execution_*` events.

pub mod utils;

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::TroupeError;
use crate::events::bus::EventBus;
use crate::events::types::agent_events::{
    AgentExecutionCompletedEvent, AgentExecutionErrorEvent, AgentExecutionStartedEvent,
    LiteAgentExecutionCompletedEvent, LiteAgentExecutionErrorEvent,
    LiteAgentExecutionStartedEvent,
};
use crate::events::types::reasoning_events::{
    AgentReasoningCompletedEvent, AgentReasoningFailedEvent, AgentReasoningStartedEvent,
};
use crate::agents::executor::{AgentExecutor, ExecutorResult, DEFAULT_MAX_ITER};
use crate::llm::Llm;
use crate::llms::base::{LlmMessage, LlmProvider, ProviderState};
use crate::security::SecurityConfig;
use crate::tasks::guardrail::{Guardrail, LlmGuardrail};
use crate::tools::agent_tools::AddImageTool;
use crate::tools::{Tool, ToolCache, ToolRegistry};
use crate::types::usage_metrics::UsageMetrics;
use crate::utilities::interpolate::interpolate;
use crate::utilities::prompts::{PromptContext, Prompts};
use crate::utilities::rpm::RpmController;

/// Callback invoked after each loop step with the model's raw output.
pub type StepCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Result of a standalone [`Agent::kickoff`] run.
#[derive(Debug, Clone)]
pub struct LiteAgentOutput {
    /// The final answer.
    pub raw: String,
    /// Full conversation transcript.
    pub messages: Vec<LlmMessage>,
    /// Usage for the run.
    pub usage: UsageMetrics,
}

/// What a task execution hands back to the task runtime.
#[derive(Debug, Clone)]
pub struct AgentTaskResult {
    /// The final answer.
    pub output: String,
    /// Full conversation transcript.
    pub messages: Vec<LlmMessage>,
    /// Tool invocations that ran.
    pub used_tools: i32,
    /// Tool invocations that errored.
    pub tools_errors: i32,
    /// Usage for the run.
    pub usage: UsageMetrics,
}

/// A persona-driven worker.
#[derive(Serialize, Deserialize)]
pub struct Agent {
    /// Unique identity; fresh on every clone.
    pub id: Uuid,
    /// Who the agent is.
    pub role: String,
    /// What the agent is trying to achieve.
    pub goal: String,
    /// The voice and experience behind the role.
    pub backstory: String,

    /// Provider identifier, e.g. `"openai/gpt-4o"` or a bare model name.
    pub llm: Option<String>,
    /// Tool names this agent advertises. The invocable implementations
    /// ride in `tool_impls`.
    pub tools: Vec<String>,

    // -- limits --
    /// Loop iteration bound.
    pub max_iter: u32,
    /// Requests-per-minute cap.
    pub max_rpm: Option<i32>,
    /// Wall-clock bound for one task execution, in seconds.
    pub max_execution_time: Option<i64>,
    /// Parse-failure retry budget.
    pub max_retry_limit: i32,
    /// Completion token cap forwarded to the provider.
    pub max_tokens: Option<u32>,

    // -- toggles --
    /// May delegate to coworkers.
    pub allow_delegation: bool,
    /// May run generated code (tooling supplied by a collaborator).
    pub allow_code_execution: bool,
    /// Trim conversation to the model's usable window.
    pub respect_context_window: bool,
    /// Run a planning pre-step before executing.
    pub reasoning: bool,
    /// Planning attempts before giving up on a plan.
    pub max_reasoning_attempts: Option<i32>,
    /// Gets the image-attachment tool.
    pub multimodal: bool,
    /// Append the current date to task descriptions.
    pub inject_date: bool,
    /// Format for the injected date.
    pub date_format: String,
    /// Per-step logging events.
    pub verbose: bool,
    /// Reuse tool results across identical invocations.
    pub cache: bool,

    // -- prompt overrides --
    pub system_template: Option<String>,
    pub prompt_template: Option<String>,
    pub response_template: Option<String>,

    // -- guardrails --
    /// Plain-language guardrail, compiled to an LLM guardrail at run time.
    pub guardrail: Option<String>,
    /// Re-prompt budget for guardrail rejections.
    pub guardrail_max_retries: i32,

    // -- opaque configuration (validated by collaborators, not here) --
    pub config: Option<HashMap<String, Value>>,
    pub knowledge_config: Option<HashMap<String, Value>>,
    pub knowledge: Option<Value>,
    pub embedder: Option<HashMap<String, Value>>,
    pub a2a: Option<Value>,

    /// Identity stamp.
    pub security_config: SecurityConfig,

    // -- non-serialized state --
    /// Invocable tools behind the advertised names.
    #[serde(skip)]
    pub tool_impls: Vec<Arc<dyn Tool>>,
    /// Compiled guardrails, evaluated alongside `guardrail`.
    #[serde(skip)]
    pub guardrails: Vec<Guardrail>,
    /// Provider override; wins over `llm` when set. Test seam.
    #[serde(skip)]
    pub provider_override: Option<Arc<dyn LlmProvider>>,
    /// Called after each loop step with the raw model output.
    #[serde(skip)]
    pub step_callback: Option<StepCallback>,
    /// Transcript of the most recent execution.
    #[serde(skip)]
    pub last_messages: Vec<LlmMessage>,
    /// Usage accumulated across this agent's executions.
    #[serde(skip)]
    pub usage_metrics: UsageMetrics,

    #[serde(skip)]
    times_executed: u32,
    #[serde(skip)]
    original_role: Option<String>,
    #[serde(skip)]
    original_goal: Option<String>,
    #[serde(skip)]
    original_backstory: Option<String>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("goal", &self.goal)
            .field("llm", &self.llm)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

impl Clone for Agent {
    fn clone(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: self.role.clone(),
            goal: self.goal.clone(),
            backstory: self.backstory.clone(),
            llm: self.llm.clone(),
            tools: self.tools.clone(),
            max_iter: self.max_iter,
            max_rpm: self.max_rpm,
            max_execution_time: self.max_execution_time,
            max_retry_limit: self.max_retry_limit,
            max_tokens: self.max_tokens,
            allow_delegation: self.allow_delegation,
            allow_code_execution: self.allow_code_execution,
            respect_context_window: self.respect_context_window,
            reasoning: self.reasoning,
            max_reasoning_attempts: self.max_reasoning_attempts,
            multimodal: self.multimodal,
            inject_date: self.inject_date,
            date_format: self.date_format.clone(),
            verbose: self.verbose,
            cache: self.cache,
            system_template: self.system_template.clone(),
            prompt_template: self.prompt_template.clone(),
            response_template: self.response_template.clone(),
            guardrail: self.guardrail.clone(),
            guardrail_max_retries: self.guardrail_max_retries,
            config: self.config.clone(),
            knowledge_config: self.knowledge_config.clone(),
            knowledge: self.knowledge.clone(),
            embedder: self.embedder.clone(),
            a2a: self.a2a.clone(),
            security_config: SecurityConfig::default(),
            tool_impls: self.tool_impls.clone(),
            guardrails: self.guardrails.clone(),
            provider_override: self.provider_override.clone(),
            step_callback: None,
            last_messages: Vec::new(),
            usage_metrics: UsageMetrics::new(),
            times_executed: 0,
            original_role: self.original_role.clone(),
            original_goal: self.original_goal.clone(),
            original_backstory: self.original_backstory.clone(),
        }
    }
}

impl Agent {
    /// New agent from its persona triple.
    pub fn new(
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
            llm: None,
            tools: Vec::new(),
            max_iter: DEFAULT_MAX_ITER,
            max_rpm: None,
            max_execution_time: None,
            max_retry_limit: 2,
            max_tokens: None,
            allow_delegation: false,
            allow_code_execution: false,
            respect_context_window: true,
            reasoning: false,
            max_reasoning_attempts: None,
            multimodal: false,
            inject_date: false,
            date_format: "%Y-%m-%d".to_string(),
            verbose: false,
            cache: true,
            system_template: None,
            prompt_template: None,
            response_template: None,
            guardrail: None,
            guardrail_max_retries: 3,
            config: None,
            knowledge_config: None,
            knowledge: None,
            embedder: None,
            a2a: None,
            security_config: SecurityConfig::default(),
            tool_impls: Vec::new(),
            guardrails: Vec::new(),
            provider_override: None,
            step_callback: None,
            last_messages: Vec::new(),
            usage_metrics: UsageMetrics::new(),
            times_executed: 0,
            original_role: None,
            original_goal: None,
            original_backstory: None,
        }
    }

    /// Set the provider identifier.
    pub fn with_llm(mut self, llm: impl Into<String>) -> Self {
        self.llm = Some(llm.into());
        self
    }

    /// Attach an invocable tool (and advertise its name).
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool.name().to_string());
        self.tool_impls.push(tool);
        self
    }

    /// Install a provider directly, bypassing `llm` resolution. Test seam
    /// and extension point for custom backends.
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider_override = Some(provider);
        self
    }

    // -- identity -----------------------------------------------------------

    /// Stable key: md5 over the pre-interpolation persona triple.
    pub fn key(&self) -> String {
        let role = self.original_role.as_deref().unwrap_or(&self.role);
        let goal = self.original_goal.as_deref().unwrap_or(&self.goal);
        let backstory = self.original_backstory.as_deref().unwrap_or(&self.backstory);
        let mut hasher = Md5::new();
        hasher.update(format!("{}|{}|{}", role, goal, backstory).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Fingerprint of this agent.
    pub fn fingerprint(&self) -> &crate::security::Fingerprint {
        &self.security_config.fingerprint
    }

    /// Interpolate `{key}` placeholders into the persona triple. Originals
    /// are captured on first call and never overwritten, so the key stays
    /// stable across repeated interpolation.
    pub fn interpolate_inputs(&mut self, inputs: &HashMap<String, String>) {
        if self.original_role.is_none() {
            self.original_role = Some(self.role.clone());
        }
        if self.original_goal.is_none() {
            self.original_goal = Some(self.goal.clone());
        }
        if self.original_backstory.is_none() {
            self.original_backstory = Some(self.backstory.clone());
        }
        if inputs.is_empty() {
            return;
        }
        self.role = interpolate(self.original_role.as_ref().expect("captured above"), inputs);
        self.goal = interpolate(self.original_goal.as_ref().expect("captured above"), inputs);
        self.backstory = interpolate(
            self.original_backstory.as_ref().expect("captured above"),
            inputs,
        );
    }

    // -- provider -----------------------------------------------------------

    /// Resolve the provider: the override when installed, else the `llm`
    /// identifier (defaulting to `openai/gpt-4o-mini`). ReAct mode gets
    /// the `Observation:` stop word.
    fn build_provider(&self, tools_present: bool) -> Result<Arc<dyn LlmProvider>, TroupeError> {
        if let Some(ref provider) = self.provider_override {
            return Ok(provider.clone());
        }
        let identifier = self.llm.as_deref().unwrap_or("openai/gpt-4o-mini");
        let mut config = Llm::new(identifier);
        config.max_tokens = self.max_tokens;

        let mut provider = config.build_provider()?;
        let native = provider.supports_function_calling() && tools_present;
        if !native {
            provider.set_stop(vec!["Observation:".to_string()]);
        }
        Ok(Arc::from(provider))
    }

    /// Tool registry for one execution: the explicit override, else this
    /// agent's own tools, plus the image tool for multimodal agents.
    fn build_registry(&self, tools: Option<ToolRegistry>) -> ToolRegistry {
        let mut registry = match tools {
            Some(registry) => registry,
            None => ToolRegistry::from_tools(self.tool_impls.clone()),
        };
        if self.multimodal {
            registry.register(Arc::new(AddImageTool));
        }
        registry
    }

    fn active_guardrails(&self) -> Vec<Guardrail> {
        let mut guardrails = self.guardrails.clone();
        if let Some(ref description) = self.guardrail {
            let llm = Llm::new(self.llm.as_deref().unwrap_or("openai/gpt-4o-mini"));
            guardrails.push(Guardrail::Llm(LlmGuardrail::new(description.clone(), llm)));
        }
        guardrails
    }

    // -- reasoning pre-step -------------------------------------------------

    /// Ask the model for a plan before executing; the plan is appended to
    /// the task description. Failures degrade to executing without a plan.
    fn reasoning_plan(&self, provider: &Arc<dyn LlmProvider>, task_description: &str) -> Option<String> {
        let bus = EventBus::global();
        let attempts = self.max_reasoning_attempts.unwrap_or(1).max(1) as u32;

        for attempt in 1..=attempts {
            let mut started = AgentReasoningStartedEvent::new(
                self.role.clone(),
                self.id.to_string(),
                attempt,
            );
            bus.emit(Arc::new(self.id.to_string()), &mut started);

            let messages =
                ProviderState::string_to_messages(&Prompts::reasoning_plan(task_description));
            // Every attempt closes its reasoning scope, even the ones that
            // fall through to a retry.
            match provider.call(messages, None, None) {
                Ok(Value::String(plan)) if !plan.trim().is_empty() => {
                    let mut completed = AgentReasoningCompletedEvent::new(
                        self.role.clone(),
                        self.id.to_string(),
                        plan.clone(),
                    );
                    bus.emit(Arc::new(self.id.to_string()), &mut completed);
                    return Some(plan);
                }
                Ok(_) => {
                    let mut failed = AgentReasoningFailedEvent::new(
                        self.role.clone(),
                        self.id.to_string(),
                        "planner returned no usable plan".to_string(),
                    );
                    bus.emit(Arc::new(self.id.to_string()), &mut failed);
                }
                Err(error) => {
                    let mut failed = AgentReasoningFailedEvent::new(
                        self.role.clone(),
                        self.id.to_string(),
                        error.to_string(),
                    );
                    bus.emit(Arc::new(self.id.to_string()), &mut failed);
                }
            }
        }
        None
    }

    // -- execution ----------------------------------------------------------

    /// Execute a task and return only the final answer.
    pub fn execute_task(
        &mut self,
        task_description: &str,
        context: Option<&str>,
        tools: Option<ToolRegistry>,
    ) -> Result<String, TroupeError> {
        self.execute_task_with_transcript(task_description, context, tools)
            .map(|result| result.output)
    }

    /// Execute a task, returning the transcript and counters alongside the
    /// answer. The task runtime consumes this form.
    pub fn execute_task_with_transcript(
        &mut self,
        task_description: &str,
        context: Option<&str>,
        tools: Option<ToolRegistry>,
    ) -> Result<AgentTaskResult, TroupeError> {
        utils::validate_max_execution_time(self.max_execution_time)?;
        self.times_executed += 1;

        let registry = self.build_registry(tools);
        let provider = self.build_provider(!registry.is_empty())?;

        let mut description = task_description.to_string();
        if self.reasoning {
            if let Some(plan) = self.reasoning_plan(&provider, &description) {
                description = format!("{}\n\nReasoning Plan:\n{}", description, plan);
            }
        }
        if self.inject_date {
            let date = chrono::Local::now().format(&self.date_format);
            description = format!("{}\n\nCurrent Date: {}", description, date);
        }

        let task_prompt = utils::format_task_with_context(&description, context);
        let native = provider.supports_function_calling() && !registry.is_empty();
        let prompts = Prompts::new(
            self.system_template.clone(),
            self.prompt_template.clone(),
            self.response_template.clone(),
        );
        let assembled = prompts.task_execution(
            &PromptContext {
                role: &self.role,
                goal: &self.goal,
                backstory: &self.backstory,
                tool_names: &registry.names().join(", "),
                tool_descriptions: &registry.descriptions_block(),
            },
            &task_prompt,
            !registry.is_empty(),
            native,
        );

        let bus = EventBus::global();
        let mut started = AgentExecutionStartedEvent::new(
            self.role.clone(),
            self.id.to_string(),
            task_prompt.clone(),
            Some(registry.names()),
        );
        bus.emit(Arc::new(self.id.to_string()), &mut started);

        let mut executor = AgentExecutor::new(
            provider,
            registry,
            self.role.clone(),
            self.id.to_string(),
        );
        executor.max_iter = self.max_iter;
        executor.max_retry_limit = self.max_retry_limit;
        executor.guardrails = self.active_guardrails();
        executor.guardrail_max_retries = self.guardrail_max_retries;
        executor.use_native_tools = native;
        executor.respect_context_window = self.respect_context_window;
        executor.verbose = self.verbose;
        executor.rpm = self.max_rpm.map(|max| Arc::new(RpmController::new(Some(max))));
        if self.cache {
            executor.cache = Some(Arc::new(ToolCache::new()));
        }

        let outcome = match self.max_execution_time {
            Some(seconds) => run_with_timeout(executor, assembled, seconds),
            None => executor.invoke(assembled),
        };

        match outcome {
            Ok(result) => {
                let mut completed = AgentExecutionCompletedEvent::new(
                    self.role.clone(),
                    self.id.to_string(),
                    result.output.clone(),
                );
                bus.emit(Arc::new(self.id.to_string()), &mut completed);

                if let Some(ref callback) = self.step_callback {
                    callback(&result.output);
                }
                self.last_messages = result.messages.clone();
                self.usage_metrics.add_usage_metrics(&result.usage);

                Ok(AgentTaskResult {
                    output: result.output,
                    messages: result.messages,
                    used_tools: result.used_tools,
                    tools_errors: result.tools_errors,
                    usage: result.usage,
                })
            }
            Err(error) => {
                let mut failed = AgentExecutionErrorEvent::new(
                    self.role.clone(),
                    self.id.to_string(),
                    error.to_string(),
                );
                bus.emit(Arc::new(self.id.to_string()), &mut failed);
                Err(error)
            }
        }
    }

    /// Standalone execution without a crew.
    pub fn kickoff(&mut self, query: &str) -> Result<LiteAgentOutput, TroupeError> {
        let registry = self.build_registry(None);
        let provider = self.build_provider(!registry.is_empty())?;
        let native = provider.supports_function_calling() && !registry.is_empty();

        let prompts = Prompts::new(
            self.system_template.clone(),
            self.prompt_template.clone(),
            self.response_template.clone(),
        );
        let assembled = prompts.task_execution(
            &PromptContext {
                role: &self.role,
                goal: &self.goal,
                backstory: &self.backstory,
                tool_names: &registry.names().join(", "),
                tool_descriptions: &registry.descriptions_block(),
            },
            query,
            !registry.is_empty(),
            native,
        );

        let bus = EventBus::global();
        let mut started = LiteAgentExecutionStartedEvent::new(
            self.role.clone(),
            self.id.to_string(),
            query.to_string(),
        );
        bus.emit(Arc::new(self.id.to_string()), &mut started);

        let mut executor = AgentExecutor::new(
            provider,
            registry,
            self.role.clone(),
            self.id.to_string(),
        );
        executor.max_iter = self.max_iter;
        executor.max_retry_limit = self.max_retry_limit;
        executor.guardrails = self.active_guardrails();
        executor.guardrail_max_retries = self.guardrail_max_retries;
        executor.use_native_tools = native;
        executor.respect_context_window = self.respect_context_window;
        executor.verbose = self.verbose;

        match executor.invoke(assembled) {
            Ok(result) => {
                let mut completed = LiteAgentExecutionCompletedEvent::new(
                    self.role.clone(),
                    self.id.to_string(),
                    result.output.clone(),
                );
                bus.emit(Arc::new(self.id.to_string()), &mut completed);
                self.last_messages = result.messages.clone();
                self.usage_metrics.add_usage_metrics(&result.usage);
                Ok(LiteAgentOutput {
                    raw: result.output,
                    messages: result.messages,
                    usage: result.usage,
                })
            }
            Err(error) => {
                let mut failed = LiteAgentExecutionErrorEvent::new(
                    self.role.clone(),
                    self.id.to_string(),
                    error.to_string(),
                );
                bus.emit(Arc::new(self.id.to_string()), &mut failed);
                Err(error)
            }
        }
    }
}

/// Run the executor on a worker thread and give up after `seconds`. The
/// worker is not forcibly cancelled; its result is discarded.
fn run_with_timeout(
    mut executor: AgentExecutor,
    prompt: crate::utilities::prompts::AssembledPrompt,
    seconds: i64,
) -> Result<ExecutorResult, TroupeError> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(executor.invoke(prompt));
    });
    match rx.recv_timeout(Duration::from_secs(seconds as u64)) {
        Ok(result) => result,
        Err(_) => Err(TroupeError::Timeout(seconds)),
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Agent(role={}, goal={})", self.role, self.goal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llms::providers::MockProvider;

    fn mock_agent(responses: Vec<&str>) -> Agent {
        Agent::new("tester", "test things", "an experienced tester")
            .with_provider(Arc::new(MockProvider::new(responses)))
    }

    #[test]
    fn key_is_stable_across_interpolation() {
        let mut agent = Agent::new("{seniority} writer", "write about {topic}", "expert");
        let before = agent.key();

        let mut inputs = HashMap::new();
        inputs.insert("seniority".to_string(), "senior".to_string());
        inputs.insert("topic".to_string(), "Rust".to_string());
        agent.interpolate_inputs(&inputs);

        assert_eq!(agent.role, "senior writer");
        assert_eq!(agent.goal, "write about Rust");
        assert_eq!(agent.key(), before);

        // Interpolating again with different inputs rewrites from the
        // originals, not from the already-interpolated strings.
        let mut other = HashMap::new();
        other.insert("seniority".to_string(), "staff".to_string());
        other.insert("topic".to_string(), "Go".to_string());
        agent.interpolate_inputs(&other);
        assert_eq!(agent.role, "staff writer");
        assert_eq!(agent.key(), before);
    }

    #[test]
    fn clone_gets_fresh_identity_and_reset_state() {
        let mut agent = mock_agent(vec!["Thought: ok\nFinal Answer: done"]);
        agent.execute_task("do it", None, None).unwrap();
        assert!(!agent.last_messages.is_empty());

        let cloned = agent.clone();
        assert_ne!(cloned.id, agent.id);
        assert_ne!(
            cloned.fingerprint().uuid_str(),
            agent.fingerprint().uuid_str()
        );
        assert!(cloned.last_messages.is_empty());
        assert_eq!(cloned.usage_metrics, UsageMetrics::new());
        assert_eq!(cloned.role, agent.role);
        assert_eq!(cloned.key(), agent.key());
    }

    #[test]
    fn execute_task_returns_the_final_answer() {
        let mut agent = mock_agent(vec!["Thought: ok\nFinal Answer: the report"]);
        let output = agent.execute_task("write a report", None, None).unwrap();
        assert_eq!(output, "the report");
        assert_eq!(agent.usage_metrics.successful_requests, 1);
    }

    #[test]
    fn context_is_threaded_into_the_prompt() {
        let mut agent = mock_agent(vec!["Thought: ok\nFinal Answer: used context"]);
        let result = agent
            .execute_task_with_transcript("critique the intro", Some("The intro text"), None)
            .unwrap();
        let user_message = result.messages[1]["content"].as_str().unwrap();
        assert!(user_message.contains("critique the intro"));
        assert!(user_message.contains("The intro text"));
    }

    #[test]
    fn non_positive_timeout_is_rejected_up_front() {
        let mut agent = mock_agent(vec!["Thought: ok\nFinal Answer: x"]);
        agent.max_execution_time = Some(0);
        let result = agent.execute_task("anything", None, None);
        assert!(matches!(result, Err(TroupeError::Config(_))));
    }

    #[test]
    fn timeout_surfaces_as_a_timeout_error() {
        struct SlowTool;
        impl Tool for SlowTool {
            fn name(&self) -> &str {
                "slow"
            }
            fn description(&self) -> &str {
                "sleeps"
            }
            fn run(&self, _args: &Value) -> Result<String, TroupeError> {
                std::thread::sleep(Duration::from_secs(5));
                Ok("done".into())
            }
        }

        let mut agent = Agent::new("t", "g", "b")
            .with_provider(Arc::new(MockProvider::new(vec![
                "Thought: t\nAction: slow\nAction Input: {}",
                "Thought: ok\nFinal Answer: done",
            ])))
            .with_tool(Arc::new(SlowTool));
        agent.max_execution_time = Some(1);

        let result = agent.execute_task("slow task", None, None);
        assert!(matches!(result, Err(TroupeError::Timeout(1))));
    }

    #[test]
    fn inject_date_appends_the_current_date() {
        let mut agent = mock_agent(vec!["Thought: ok\nFinal Answer: dated"]);
        agent.inject_date = true;
        let result = agent
            .execute_task_with_transcript("summarize today", None, None)
            .unwrap();
        let user_message = result.messages[1]["content"].as_str().unwrap();
        assert!(user_message.contains("Current Date:"));
    }

    #[test]
    fn reasoning_prepends_a_plan() {
        // First scripted response answers the planning prompt, the second
        // the actual task.
        let mut agent = mock_agent(vec![
            "1. read the input\n2. answer",
            "Thought: ok\nFinal Answer: planned answer",
        ]);
        agent.reasoning = true;
        let result = agent
            .execute_task_with_transcript("do planned work", None, None)
            .unwrap();
        assert_eq!(result.output, "planned answer");
        let user_message = result.messages[1]["content"].as_str().unwrap();
        assert!(user_message.contains("Reasoning Plan:"));
        assert!(user_message.contains("read the input"));
    }

    #[test]
    fn kickoff_runs_standalone() {
        let mut agent = mock_agent(vec!["Thought: ok\nFinal Answer: standalone"]);
        let output = agent.kickoff("quick question").unwrap();
        assert_eq!(output.raw, "standalone");
        assert!(output.usage.successful_requests >= 1);
    }
}
