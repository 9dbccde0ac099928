//! A task: one unit of work with a description, an expected output, and
//! an optional assignment.
//!
//! Lifecycle: constructed → interpolated → executing (start time set) →
//! produces a [`TaskOutput`] → end time set → optional file save →
//! optional callback. Task-level guardrails re-run the agent with
//! feedback up to `guardrail_max_retries` times; structured-output
//! selectors pick how the raw answer is materialized
//! (`response_model` > `output_pydantic` > `output_json` > raw).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::Agent;
use crate::core::providers::content_processor::process_content;
use crate::core::providers::human_input;
use crate::errors::TroupeError;
use crate::events::bus::EventBus;
use crate::events::types::task_events::{TaskCompletedEvent, TaskFailedEvent, TaskStartedEvent};
use crate::llms::base::ProviderState;
use crate::security::SecurityConfig;
use crate::tasks::guardrail::Guardrail;
use crate::tasks::output_format::OutputFormat;
use crate::tasks::task_output::{TaskOutput, TranscriptMessage};
use crate::tools::agent_tools::ReadFileTool;
use crate::tools::{Tool, ToolRegistry};
use crate::utilities::interpolate::interpolate;

/// Callback invoked with the finished output.
pub type TaskCallback = Box<dyn Fn(&TaskOutput) + Send + Sync>;

/// A unit of work.
#[derive(Serialize, Deserialize)]
pub struct Task {
    /// Unique identity; fresh on every clone.
    pub id: Uuid,
    /// Optional short name.
    pub name: Option<String>,
    /// What to do.
    pub description: String,
    /// What a good answer looks like.
    pub expected_output: String,
    /// Role of the agent assigned to this task, when pinned.
    pub agent: Option<String>,
    /// Ids of predecessor tasks whose outputs feed this one. The crew
    /// overrides this with the actual outputs at run time.
    pub context: Option<Vec<Uuid>>,
    /// Run on a background worker; the crew collects the result before
    /// the next dependent task.
    pub async_execution: bool,

    // -- structured output selectors --
    /// Materialize the answer as a JSON dictionary.
    pub output_json: Option<String>,
    /// Materialize the answer as a structured value.
    pub output_pydantic: Option<String>,
    /// Native structured output; wins over the other two.
    pub response_model: Option<String>,

    // -- file output --
    /// Where to save the raw answer.
    pub output_file: Option<String>,
    /// Create missing parent directories for `output_file`.
    pub create_directory: bool,

    /// Tool names this task restricts the agent to.
    pub tools: Vec<String>,
    /// Named input files (reference name → path), exposed through the
    /// read-file tool.
    pub input_files: HashMap<String, String>,

    /// Ask for Markdown formatting in the prompt.
    pub markdown: bool,
    /// Route the final answer through the human-input provider.
    pub human_input: bool,

    // -- guardrails --
    /// Plain-language guardrail description.
    pub guardrail: Option<String>,
    /// Re-prompt budget for guardrail rejections.
    pub guardrail_max_retries: i32,

    // -- counters --
    pub used_tools: i32,
    pub tools_errors: i32,
    pub delegations: i32,
    pub retry_count: i32,

    // -- timing --
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    /// Roles that have touched this task.
    pub processed_by_agents: HashSet<String>,
    /// Context string actually used at execution time.
    pub prompt_context: Option<String>,
    /// The produced output.
    pub output: Option<TaskOutput>,
    /// Identity stamp.
    pub security_config: SecurityConfig,

    // -- non-serialized state --
    /// Compiled guardrails evaluated against the output.
    #[serde(skip)]
    pub guardrails: Vec<Guardrail>,
    /// Invocable tools behind `tools`.
    #[serde(skip)]
    pub tool_impls: Vec<Arc<dyn Tool>>,
    /// Completion callback.
    #[serde(skip)]
    pub callback: Option<TaskCallback>,

    #[serde(skip)]
    original_description: Option<String>,
    #[serde(skip)]
    original_expected_output: Option<String>,
    #[serde(skip)]
    original_output_file: Option<String>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("expected_output", &self.expected_output)
            .field("agent", &self.agent)
            .field("async_execution", &self.async_execution)
            .finish_non_exhaustive()
    }
}

impl Clone for Task {
    fn clone(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            description: self.description.clone(),
            expected_output: self.expected_output.clone(),
            agent: self.agent.clone(),
            context: self.context.clone(),
            async_execution: self.async_execution,
            output_json: self.output_json.clone(),
            output_pydantic: self.output_pydantic.clone(),
            response_model: self.response_model.clone(),
            output_file: self.output_file.clone(),
            create_directory: self.create_directory,
            tools: self.tools.clone(),
            input_files: self.input_files.clone(),
            markdown: self.markdown,
            human_input: self.human_input,
            guardrail: self.guardrail.clone(),
            guardrail_max_retries: self.guardrail_max_retries,
            used_tools: 0,
            tools_errors: 0,
            delegations: 0,
            retry_count: 0,
            start_time: None,
            end_time: None,
            processed_by_agents: HashSet::new(),
            prompt_context: None,
            output: None,
            security_config: SecurityConfig::default(),
            guardrails: self.guardrails.clone(),
            tool_impls: self.tool_impls.clone(),
            callback: None,
            original_description: self.original_description.clone(),
            original_expected_output: self.original_expected_output.clone(),
            original_output_file: self.original_output_file.clone(),
        }
    }
}

impl Task {
    /// New task from its description and expected output.
    pub fn new(description: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            description: description.into(),
            expected_output: expected_output.into(),
            agent: None,
            context: None,
            async_execution: false,
            output_json: None,
            output_pydantic: None,
            response_model: None,
            output_file: None,
            create_directory: true,
            tools: Vec::new(),
            input_files: HashMap::new(),
            markdown: false,
            human_input: false,
            guardrail: None,
            guardrail_max_retries: 3,
            used_tools: 0,
            tools_errors: 0,
            delegations: 0,
            retry_count: 0,
            start_time: None,
            end_time: None,
            processed_by_agents: HashSet::new(),
            prompt_context: None,
            output: None,
            security_config: SecurityConfig::default(),
            guardrails: Vec::new(),
            tool_impls: Vec::new(),
            callback: None,
            original_description: None,
            original_expected_output: None,
            original_output_file: None,
        }
    }

    /// Pin the task to an agent role.
    pub fn with_agent(mut self, role: impl Into<String>) -> Self {
        self.agent = Some(role.into());
        self
    }

    /// Attach an invocable tool restriction.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool.name().to_string());
        self.tool_impls.push(tool);
        self
    }

    // -- identity -----------------------------------------------------------

    /// Stable key: md5 over the pre-interpolation description and
    /// expected output.
    pub fn key(&self) -> String {
        let description = self
            .original_description
            .as_deref()
            .unwrap_or(&self.description);
        let expected = self
            .original_expected_output
            .as_deref()
            .unwrap_or(&self.expected_output);
        let mut hasher = Md5::new();
        hasher.update(format!("{}|{}", description, expected).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Interpolate `{key}` placeholders into the description, expected
    /// output, and output file path. Originals are captured once.
    pub fn interpolate_inputs(&mut self, inputs: &HashMap<String, String>) {
        if self.original_description.is_none() {
            self.original_description = Some(self.description.clone());
        }
        if self.original_expected_output.is_none() {
            self.original_expected_output = Some(self.expected_output.clone());
        }
        if self.output_file.is_some() && self.original_output_file.is_none() {
            self.original_output_file = self.output_file.clone();
        }
        if inputs.is_empty() {
            return;
        }
        self.description =
            interpolate(self.original_description.as_ref().expect("captured above"), inputs);
        self.expected_output = interpolate(
            self.original_expected_output.as_ref().expect("captured above"),
            inputs,
        );
        if let Some(ref original) = self.original_output_file {
            self.output_file = Some(interpolate(original, inputs));
        }
    }

    // -- prompt -------------------------------------------------------------

    /// The prompt handed to the agent: description, expected output, and
    /// the Markdown instructions when requested.
    pub fn prompt(&self) -> String {
        let mut slices = vec![
            self.description.clone(),
            format!("Expected Output: {}", self.expected_output),
        ];
        if self.markdown {
            slices.push(
                "Your final answer MUST be formatted in Markdown syntax.\n\
                 Use # for headers, ** for bold, - for bullet points, and \
                 ```language fences for code blocks."
                    .to_string(),
            );
        }
        slices.join("\n")
    }

    /// Which representation the structured-output selectors pick.
    pub fn output_format(&self) -> OutputFormat {
        if self.response_model.is_some() || self.output_pydantic.is_some() {
            OutputFormat::Pydantic
        } else if self.output_json.is_some() {
            OutputFormat::Json
        } else {
            OutputFormat::Raw
        }
    }

    // -- execution ----------------------------------------------------------

    /// Execute the task synchronously through the given agent.
    pub fn execute_sync(
        &mut self,
        agent: &mut Agent,
        context: Option<&str>,
    ) -> Result<TaskOutput, TroupeError> {
        self.start_time = Some(Utc::now());
        self.prompt_context = context.map(str::to_string);
        self.processed_by_agents.insert(agent.role.clone());

        let bus = EventBus::global();
        let mut started = TaskStartedEvent::new(
            Some(self.id.to_string()),
            self.name.clone(),
            context.map(str::to_string),
        );
        bus.emit(Arc::new(self.id.to_string()), &mut started);

        // The file save stays inside the bracketed section so a write
        // failure still closes the task scope with task_failed.
        let outcome = self.run_with_guardrails(agent, context).and_then(|output| {
            if self.output_file.is_some() {
                self.save_file(&output.raw)?;
            }
            Ok(output)
        });

        match outcome {
            Ok(output) => {
                self.end_time = Some(Utc::now());
                self.output = Some(output.clone());
                if let Some(ref callback) = self.callback {
                    callback(&output);
                }

                let mut completed = TaskCompletedEvent::new(
                    Some(self.id.to_string()),
                    self.name.clone(),
                    serde_json::to_value(&output).unwrap_or(Value::Null),
                );
                bus.emit(Arc::new(self.id.to_string()), &mut completed);
                Ok(output)
            }
            Err(error) => {
                self.end_time = Some(Utc::now());
                let mut failed = TaskFailedEvent::new(
                    Some(self.id.to_string()),
                    self.name.clone(),
                    error.to_string(),
                );
                bus.emit(Arc::new(self.id.to_string()), &mut failed);
                Err(error)
            }
        }
    }

    /// Spawn the task on a background worker. The crew joins the handle
    /// before the first dependent task runs.
    pub fn execute_async(
        &self,
        mut agent: Agent,
        context: Option<String>,
    ) -> std::thread::JoinHandle<Result<TaskOutput, TroupeError>> {
        let mut task = self.clone();
        std::thread::spawn(move || task.execute_sync(&mut agent, context.as_deref()))
    }

    /// The agent run plus the task-level guardrail loop.
    fn run_with_guardrails(
        &mut self,
        agent: &mut Agent,
        context: Option<&str>,
    ) -> Result<TaskOutput, TroupeError> {
        let tools = self.execution_tools();
        let base_prompt = self.prompt();
        let mut prompt = base_prompt.clone();

        loop {
            let result = agent.execute_task_with_transcript(&prompt, context, tools.clone())?;
            self.used_tools += result.used_tools;
            self.tools_errors += result.tools_errors;

            let raw = if self.human_input {
                human_input::handle_feedback(&result.output, false)
            } else {
                result.output.clone()
            };
            let raw = process_content(&raw, None);

            let mut output = TaskOutput {
                description: self.description.clone(),
                name: self.name.clone(),
                expected_output: Some(self.expected_output.clone()),
                summary: Some(TaskOutput::summarize(&self.description)),
                raw,
                pydantic: None,
                json_dict: None,
                agent: agent.role.clone(),
                output_format: self.output_format(),
                messages: sanitize_transcript(&result.messages),
            };
            self.materialize_structured_output(&mut output);

            match self.check_guardrails(&output)? {
                None => return Ok(output),
                Some(feedback) => {
                    self.retry_count += 1;
                    if self.retry_count > self.guardrail_max_retries {
                        return Err(TroupeError::Guardrail(format!(
                            "task output still rejected after {} retries: {}",
                            self.guardrail_max_retries, feedback
                        )));
                    }
                    prompt = format!(
                        "{}\n\nYour previous answer was rejected: {}\nAddress the feedback and answer again.",
                        base_prompt, feedback
                    );
                }
            }
        }
    }

    /// Evaluate the task guardrails. `None` means accepted; `Some` carries
    /// the rejection feedback.
    fn check_guardrails(&self, output: &TaskOutput) -> Result<Option<String>, TroupeError> {
        for guardrail in &self.guardrails {
            let verdict = guardrail.evaluate(&output.raw)?;
            if !verdict.passed {
                return Ok(Some(verdict.feedback.unwrap_or_default()));
            }
        }
        Ok(None)
    }

    /// The registry handed to the agent when this task restricts tools or
    /// carries input files; `None` lets the agent use its own.
    fn execution_tools(&self) -> Option<ToolRegistry> {
        if self.tool_impls.is_empty() && self.input_files.is_empty() {
            return None;
        }
        let mut registry = ToolRegistry::from_tools(self.tool_impls.clone());
        if !self.input_files.is_empty() {
            registry.register(Arc::new(ReadFileTool::new(self.input_files.clone())));
        }
        Some(registry)
    }

    /// Parse the raw answer into the selected structured representation.
    /// A parse failure leaves the raw text in place with a warning; the
    /// answer itself is still useful.
    fn materialize_structured_output(&self, output: &mut TaskOutput) {
        match output.output_format {
            OutputFormat::Raw => {}
            OutputFormat::Json => match ProviderState::validate_structured_output(&output.raw) {
                Ok(Value::Object(map)) => {
                    output.json_dict = Some(map.into_iter().collect());
                }
                _ => log::warn!("task '{}' produced no parseable JSON output", self.id),
            },
            OutputFormat::Pydantic => match ProviderState::validate_structured_output(&output.raw)
            {
                Ok(value) => output.pydantic = Some(value),
                Err(_) => log::warn!(
                    "task '{}' produced no parseable structured output",
                    self.id
                ),
            },
        }
    }

    /// Seconds between start and end, when both are set.
    pub fn execution_duration(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }

    /// Record a delegation to another agent.
    pub fn increment_delegations(&mut self, agent_role: Option<&str>) {
        if let Some(role) = agent_role {
            self.processed_by_agents.insert(role.to_string());
        }
        self.delegations += 1;
    }

    /// Write the raw answer to `output_file`, creating parent directories
    /// when `create_directory` is set.
    pub fn save_file(&self, content: &str) -> Result<(), TroupeError> {
        let output_file = self
            .output_file
            .as_ref()
            .ok_or_else(|| TroupeError::Task("output_file is not set".into()))?;
        let path = std::path::Path::new(output_file);
        if self.create_directory {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TroupeError::Task(format!("failed to create output directory: {e}"))
                })?;
            }
        }
        std::fs::write(path, content)
            .map_err(|e| TroupeError::Task(format!("failed to save output file: {e}")))
    }
}

/// Keep only roles and text content; tool payloads stay in the raw
/// messages the agent retains.
fn sanitize_transcript(
    messages: &[crate::llms::base::LlmMessage],
) -> Vec<TranscriptMessage> {
    messages
        .iter()
        .filter_map(|msg| {
            let role = msg.get("role").and_then(Value::as_str)?;
            if !matches!(role, "system" | "user" | "assistant" | "tool") {
                return None;
            }
            let content = msg
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some(TranscriptMessage {
                role: role.to_string(),
                content: content.to_string(),
            })
        })
        .collect()
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Task(description={}, expected_output={})",
            self.description, self.expected_output
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llms::providers::MockProvider;
    use crate::tasks::guardrail::GuardrailVerdict;

    fn mock_agent(responses: Vec<&str>) -> Agent {
        Agent::new("tester", "test", "expert")
            .with_provider(Arc::new(MockProvider::new(responses)))
    }

    #[test]
    fn key_is_stable_across_interpolation() {
        let mut task = Task::new("Draft an intro about {topic}", "one paragraph");
        let before = task.key();

        let mut inputs = HashMap::new();
        inputs.insert("topic".to_string(), "Rust".to_string());
        task.interpolate_inputs(&inputs);

        assert_eq!(task.description, "Draft an intro about Rust");
        assert_eq!(task.key(), before);
    }

    #[test]
    fn clone_resets_identity_counters_and_timing() {
        let mut task = Task::new("d", "e");
        task.used_tools = 3;
        task.retry_count = 1;
        task.start_time = Some(Utc::now());

        let cloned = task.clone();
        assert_ne!(cloned.id, task.id);
        assert_eq!(cloned.used_tools, 0);
        assert_eq!(cloned.retry_count, 0);
        assert!(cloned.start_time.is_none());
        assert_eq!(cloned.description, task.description);
    }

    #[test]
    fn prompt_includes_expected_output_and_markdown() {
        let mut task = Task::new("write docs", "a page");
        assert!(task.prompt().contains("Expected Output: a page"));
        assert!(!task.prompt().contains("Markdown"));

        task.markdown = true;
        assert!(task.prompt().contains("Markdown"));
    }

    #[test]
    fn structured_output_precedence() {
        let mut task = Task::new("d", "e");
        assert_eq!(task.output_format(), OutputFormat::Raw);
        task.output_json = Some("Schema".into());
        assert_eq!(task.output_format(), OutputFormat::Json);
        task.output_pydantic = Some("Model".into());
        assert_eq!(task.output_format(), OutputFormat::Pydantic);
        task.response_model = Some("Native".into());
        assert_eq!(task.output_format(), OutputFormat::Pydantic);
    }

    #[test]
    fn execute_sync_produces_an_output_with_timing() {
        let mut agent = mock_agent(vec!["Thought: ok\nFinal Answer: task done"]);
        let mut task = Task::new("do something useful here please kindly", "done");

        let output = task.execute_sync(&mut agent, None).unwrap();
        assert_eq!(output.raw, "task done");
        assert_eq!(output.agent, "tester");
        assert!(output.summary.as_deref().unwrap().ends_with('…'));
        assert!(task.start_time.is_some());
        assert!(task.end_time.is_some());
        assert!(task.execution_duration().is_some());
        assert!(task.processed_by_agents.contains("tester"));
    }

    #[test]
    fn json_output_is_materialized() {
        let mut agent =
            mock_agent(vec!["Thought: ok\nFinal Answer: {\"score\": 7, \"ok\": true}"]);
        let mut task = Task::new("rate it", "json");
        task.output_json = Some("Rating".into());

        let output = task.execute_sync(&mut agent, None).unwrap();
        assert_eq!(output.output_format, OutputFormat::Json);
        let dict = output.json_dict.as_ref().unwrap();
        assert_eq!(dict["score"], serde_json::json!(7));
        assert!(output.json().unwrap().contains("score"));
    }

    #[test]
    fn guardrail_rejection_retries_then_errors() {
        // Same rejected answer every time; the retry budget runs out.
        let mut agent = mock_agent(vec!["Thought: ok\nFinal Answer: bad"]);
        let mut task = Task::new("produce good output", "good");
        task.guardrail_max_retries = 1;
        task.guardrails = vec![Guardrail::function("always rejects", |_| {
            GuardrailVerdict::fail("not good enough")
        })];

        let result = task.execute_sync(&mut agent, None);
        assert!(matches!(result, Err(TroupeError::Guardrail(_))));
        assert_eq!(task.retry_count, 2);
    }

    #[test]
    fn guardrail_acceptance_on_retry() {
        let mut agent = mock_agent(vec![
            "Thought: ok\nFinal Answer: first attempt",
            "Thought: ok\nFinal Answer: second attempt",
        ]);
        let mut task = Task::new("produce the second attempt", "it");
        task.guardrails = vec![Guardrail::function("wants the second", |output| {
            if output.contains("second") {
                GuardrailVerdict::pass()
            } else {
                GuardrailVerdict::fail("give me the second attempt")
            }
        })];

        let output = task.execute_sync(&mut agent, None).unwrap();
        assert_eq!(output.raw, "second attempt");
        assert_eq!(task.retry_count, 1);
    }

    #[test]
    fn output_file_is_saved_with_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/{topic}.txt");

        let mut agent = mock_agent(vec!["Thought: ok\nFinal Answer: saved content"]);
        let mut task = Task::new("write {topic}", "file");
        task.output_file = Some(path.to_string_lossy().into_owned());

        let mut inputs = HashMap::new();
        inputs.insert("topic".to_string(), "report".to_string());
        task.interpolate_inputs(&inputs);

        task.execute_sync(&mut agent, None).unwrap();
        let saved = dir.path().join("nested/out/report.txt");
        assert_eq!(std::fs::read_to_string(saved).unwrap(), "saved content");
    }

    #[test]
    fn async_execution_joins_with_the_output() {
        let agent = mock_agent(vec!["Thought: ok\nFinal Answer: from the worker"]);
        let task = Task::new("background work", "result");

        let handle = task.execute_async(agent, None);
        let output = handle.join().unwrap().unwrap();
        assert_eq!(output.raw, "from the worker");
    }
}
