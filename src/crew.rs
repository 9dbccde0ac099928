//! The crew: an ordered task list, an agent roster, and a process mode.
//!
//! `kickoff` interpolates inputs into tasks and agents, runs the tasks
//! under the selected process, threads each task's output into the next
//! task's context, and aggregates usage into the final [`CrewOutput`].
//! The whole run is bracketed by `crew_kickoff_*` events.

use std::collections::HashMap;
use std::sync::Arc;

use md5::{Digest, Md5};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::Agent;
use crate::crews::crew_output::CrewOutput;
use crate::errors::TroupeError;
use crate::events::bus::EventBus;
use crate::events::types::crew_events::{
    CrewKickoffCompletedEvent, CrewKickoffFailedEvent, CrewKickoffStartedEvent,
};
use crate::process::Process;
use crate::security::SecurityConfig;
use crate::task::Task;
use crate::tasks::task_output::TaskOutput;
use crate::tools::agent_tools::{sanitize_agent_name, AskQuestionTool, DelegateWorkTool};
use crate::tools::Tool;
use crate::types::usage_metrics::UsageMetrics;

/// Rewrites (or passes through) the kickoff inputs.
pub type BeforeKickoffCallback = Box<
    dyn Fn(Option<HashMap<String, String>>) -> Option<HashMap<String, String>> + Send + Sync,
>;
/// Rewrites (or passes through) the final output.
pub type AfterKickoffCallback = Box<dyn Fn(CrewOutput) -> CrewOutput + Send + Sync>;
/// Observes each finished task.
pub type TaskCompletedCallback = Box<dyn Fn(&TaskOutput) + Send + Sync>;

/// Memory kinds accepted by [`Crew::reset_memories`].
const RESET_KINDS: &[&str] = &[
    "long",
    "short",
    "entity",
    "knowledge",
    "agent_knowledge",
    "kickoff_outputs",
    "external",
    "all",
];

/// A group of agents collaborating over an ordered task list.
#[derive(Serialize, Deserialize)]
pub struct Crew {
    /// Unique identity; fresh on every copy.
    pub id: Uuid,
    /// Optional display name.
    pub name: Option<String>,
    /// Ordered tasks.
    pub tasks: Vec<Task>,
    /// Agent roster.
    pub agents: Vec<Agent>,
    /// Orchestration mode.
    pub process: Process,
    /// Verbose logging.
    pub verbose: bool,
    /// Tool-result caching for the crew's agents.
    pub cache: bool,

    // -- hierarchical process --
    /// Model for the materialized manager agent.
    pub manager_llm: Option<String>,
    /// Custom manager; wins over `manager_llm`.
    pub manager_agent: Option<Agent>,

    // -- feature toggles --
    /// Memory on/off; the backends are collaborators.
    pub memory: bool,
    /// Plan before executing (collaborator-provided planner).
    pub planning: bool,
    /// Model for the planner.
    pub planning_llm: Option<String>,
    /// Trace emission toggle.
    pub tracing: Option<bool>,
    /// Stream output toggle.
    pub stream: bool,
    /// Requests-per-minute cap applied to agents without their own.
    pub max_rpm: Option<i32>,

    // -- opaque memory / knowledge slots (validated by collaborators) --
    pub short_term_memory: Option<Value>,
    pub long_term_memory: Option<Value>,
    pub entity_memory: Option<Value>,
    pub external_memory: Option<Value>,
    pub knowledge: Option<Value>,
    pub knowledge_sources: Option<Vec<HashMap<String, Value>>>,
    pub embedder: Option<HashMap<String, Value>>,
    pub config: Option<HashMap<String, Value>>,

    /// Observational log of executed tasks. Never replayed.
    pub execution_logs: Vec<HashMap<String, Value>>,
    /// Usage aggregated by the last kickoff.
    pub usage_metrics: Option<UsageMetrics>,
    /// Identity stamp.
    pub security_config: SecurityConfig,

    // -- callbacks (not serialized, not cloned) --
    #[serde(skip)]
    pub before_kickoff_callbacks: Vec<BeforeKickoffCallback>,
    #[serde(skip)]
    pub after_kickoff_callbacks: Vec<AfterKickoffCallback>,
    #[serde(skip)]
    pub task_callback: Option<TaskCompletedCallback>,

    /// Usage from manager/async agents that are not on the roster.
    #[serde(skip)]
    extra_usage: UsageMetrics,
    #[serde(skip)]
    inputs: Option<HashMap<String, String>>,
}

impl std::fmt::Debug for Crew {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crew")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("process", &self.process)
            .field("agents", &self.agents.len())
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl Crew {
    /// New crew over the given tasks and agents.
    pub fn new(tasks: Vec<Task>, agents: Vec<Agent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            tasks,
            agents,
            process: Process::default(),
            verbose: false,
            cache: true,
            manager_llm: None,
            manager_agent: None,
            memory: false,
            planning: false,
            planning_llm: None,
            tracing: None,
            stream: false,
            max_rpm: None,
            short_term_memory: None,
            long_term_memory: None,
            entity_memory: None,
            external_memory: None,
            knowledge: None,
            knowledge_sources: None,
            embedder: None,
            config: None,
            execution_logs: Vec::new(),
            usage_metrics: None,
            security_config: SecurityConfig::default(),
            before_kickoff_callbacks: Vec::new(),
            after_kickoff_callbacks: Vec::new(),
            task_callback: None,
            extra_usage: UsageMetrics::new(),
            inputs: None,
        }
    }

    /// Select the process mode.
    pub fn with_process(mut self, process: Process) -> Self {
        self.process = process;
        self
    }

    // -- identity -----------------------------------------------------------

    /// Stable key: md5 over the agent keys and task keys, joined by `|`.
    pub fn key(&self) -> String {
        let parts: Vec<String> = self
            .agents
            .iter()
            .map(Agent::key)
            .chain(self.tasks.iter().map(Task::key))
            .collect();
        let mut hasher = Md5::new();
        hasher.update(parts.join("|").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Deep copy with a fresh identity and reset run state.
    pub fn copy(&self) -> Crew {
        Crew {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            tasks: self.tasks.clone(),
            agents: self.agents.clone(),
            process: self.process,
            verbose: self.verbose,
            cache: self.cache,
            manager_llm: self.manager_llm.clone(),
            manager_agent: self.manager_agent.clone(),
            memory: self.memory,
            planning: self.planning,
            planning_llm: self.planning_llm.clone(),
            tracing: self.tracing,
            stream: self.stream,
            max_rpm: self.max_rpm,
            short_term_memory: self.short_term_memory.clone(),
            long_term_memory: self.long_term_memory.clone(),
            entity_memory: self.entity_memory.clone(),
            external_memory: self.external_memory.clone(),
            knowledge: self.knowledge.clone(),
            knowledge_sources: self.knowledge_sources.clone(),
            embedder: self.embedder.clone(),
            config: self.config.clone(),
            execution_logs: Vec::new(),
            usage_metrics: None,
            security_config: SecurityConfig::default(),
            before_kickoff_callbacks: Vec::new(),
            after_kickoff_callbacks: Vec::new(),
            task_callback: None,
            extra_usage: UsageMetrics::new(),
            inputs: None,
        }
    }

    // -- kickoff ------------------------------------------------------------

    /// Run the crew.
    pub fn kickoff(
        &mut self,
        inputs: Option<HashMap<String, String>>,
    ) -> Result<CrewOutput, TroupeError> {
        if self.agents.is_empty() {
            return Err(TroupeError::config("crew has no agents"));
        }
        if self.tasks.is_empty() {
            return Err(TroupeError::config("crew has no tasks"));
        }

        let mut current_inputs = inputs;
        for callback in &self.before_kickoff_callbacks {
            current_inputs = callback(current_inputs);
        }
        self.inputs = current_inputs.clone();

        let bus = EventBus::global();
        let mut started =
            CrewKickoffStartedEvent::new(self.name.clone(), current_inputs.clone());
        bus.emit(Arc::new(self.id.to_string()), &mut started);

        if let Some(ref inputs) = current_inputs {
            for task in &mut self.tasks {
                task.interpolate_inputs(inputs);
            }
            for agent in &mut self.agents {
                agent.interpolate_inputs(inputs);
            }
        }

        let result = match self.process {
            Process::Sequential => self.run_sequential(),
            Process::Hierarchical => self.run_hierarchical(),
        };

        match result {
            Ok(output) => {
                let mut final_output = output;
                for callback in &self.after_kickoff_callbacks {
                    final_output = callback(final_output);
                }
                self.usage_metrics = Some(final_output.token_usage.clone());

                let mut completed = CrewKickoffCompletedEvent::new(
                    self.name.clone(),
                    serde_json::to_value(&final_output).unwrap_or(Value::Null),
                );
                bus.emit(Arc::new(self.id.to_string()), &mut completed);
                Ok(final_output)
            }
            Err(error) => {
                let mut failed =
                    CrewKickoffFailedEvent::new(self.name.clone(), error.to_string());
                bus.emit(Arc::new(self.id.to_string()), &mut failed);
                Err(error)
            }
        }
    }

    /// Run the crew once per input set, on fresh copies.
    pub fn kickoff_for_each(
        &self,
        inputs: Vec<HashMap<String, String>>,
    ) -> Vec<Result<CrewOutput, TroupeError>> {
        inputs
            .into_iter()
            .map(|input| self.copy().kickoff(Some(input)))
            .collect()
    }

    // -- sequential ---------------------------------------------------------

    fn run_sequential(&mut self) -> Result<CrewOutput, TroupeError> {
        let mut outputs: Vec<TaskOutput> = Vec::new();
        let mut pending: Vec<std::thread::JoinHandle<Result<TaskOutput, TroupeError>>> =
            Vec::new();

        let mut tasks = std::mem::take(&mut self.tasks);
        let run: Result<(), TroupeError> = (|| {
            for task in tasks.iter_mut() {
                // Context threads every previous non-empty output forward,
                // overriding any static context id list.
                if task.async_execution {
                    let context = Self::context_from(&outputs);
                    let agent = self.agent_for(task)?.clone();
                    pending.push(task.execute_async(agent, context));
                    continue;
                }

                // A synchronous task depends on everything before it; all
                // in-flight async work joins first.
                Self::drain_pending(&mut pending, &mut outputs)?;

                let context = Self::context_from(&outputs);
                let agent_index = self.agent_index_for(task)?;
                let agent = &mut self.agents[agent_index];
                let output = task.execute_sync(agent, context.as_deref())?;
                self.record_execution(task, &output);
                if let Some(ref callback) = self.task_callback {
                    callback(&output);
                }
                outputs.push(output);
            }
            Self::drain_pending(&mut pending, &mut outputs)?;
            Ok(())
        })();
        self.tasks = tasks;
        run?;

        self.build_output(outputs)
    }

    fn drain_pending(
        pending: &mut Vec<std::thread::JoinHandle<Result<TaskOutput, TroupeError>>>,
        outputs: &mut Vec<TaskOutput>,
    ) -> Result<(), TroupeError> {
        for handle in pending.drain(..) {
            let output = handle
                .join()
                .map_err(|_| TroupeError::Task("async task panicked".into()))??;
            outputs.push(output);
        }
        Ok(())
    }

    fn context_from(outputs: &[TaskOutput]) -> Option<String> {
        if outputs.is_empty() {
            return None;
        }
        let joined = outputs
            .iter()
            .filter(|o| !o.raw.is_empty())
            .map(|o| o.raw.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }

    fn agent_index_for(&self, task: &Task) -> Result<usize, TroupeError> {
        match task.agent {
            Some(ref role) => {
                let wanted = sanitize_agent_name(role);
                self.agents
                    .iter()
                    .position(|agent| sanitize_agent_name(&agent.role) == wanted)
                    .ok_or_else(|| {
                        TroupeError::config(format!(
                            "task '{}' is assigned to unknown agent role '{}'",
                            task.description, role
                        ))
                    })
            }
            // Unassigned tasks fall to the first agent in the roster.
            None => Ok(0),
        }
    }

    fn agent_for(&self, task: &Task) -> Result<&Agent, TroupeError> {
        self.agent_index_for(task).map(|index| &self.agents[index])
    }

    // -- hierarchical -------------------------------------------------------

    /// Materialize a manager that owns exactly the delegation and
    /// ask-question tools over the worker roster, and let it drive every
    /// task.
    fn run_hierarchical(&mut self) -> Result<CrewOutput, TroupeError> {
        let worker_roles: Vec<String> =
            self.agents.iter().map(|agent| agent.role.clone()).collect();
        let workers = Arc::new(Mutex::new(std::mem::take(&mut self.agents)));

        let delegate_workers = workers.clone();
        let delegate = move |role: &str, work: &str, context: &str| -> Result<String, TroupeError> {
            let wanted = sanitize_agent_name(role);
            let mut guard = delegate_workers.lock();
            let worker = guard
                .iter_mut()
                .find(|agent| sanitize_agent_name(&agent.role) == wanted)
                .ok_or_else(|| TroupeError::Tool {
                    name: "delegate_work_to_coworker".into(),
                    message: format!("no worker with role '{role}'"),
                })?;
            worker.execute_task(work, Some(context), None)
        };

        let mut manager = match self.manager_agent {
            Some(ref custom) => custom.clone(),
            None => {
                let mut manager = Agent::new(
                    "Crew Manager",
                    "Coordinate the crew: delegate each task to the best-suited coworker and synthesize their results into the expected output",
                    "A seasoned project manager who gets the best out of every specialist.",
                );
                manager.llm = self.manager_llm.clone();
                manager
            }
        };
        if manager.llm.is_none() && manager.provider_override.is_none() {
            manager.llm = self.manager_llm.clone();
        }
        manager.allow_delegation = true;

        let delegate_tool: Arc<dyn Tool> = Arc::new(DelegateWorkTool::new(
            worker_roles.clone(),
            Arc::new(delegate.clone()),
        ));
        let ask_tool: Arc<dyn Tool> =
            Arc::new(AskQuestionTool::new(worker_roles, Arc::new(delegate)));
        manager.tool_impls = vec![delegate_tool.clone(), ask_tool.clone()];
        manager.tools = vec![
            delegate_tool.name().to_string(),
            ask_tool.name().to_string(),
        ];

        let mut tasks = std::mem::take(&mut self.tasks);
        let run: Result<Vec<TaskOutput>, TroupeError> = (|| {
            let mut outputs: Vec<TaskOutput> = Vec::new();
            for task in tasks.iter_mut() {
                let context = Self::context_from(&outputs);
                let output = task.execute_sync(&mut manager, context.as_deref())?;
                self.record_execution(task, &output);
                if let Some(ref callback) = self.task_callback {
                    callback(&output);
                }
                outputs.push(output);
            }
            Ok(outputs)
        })();
        self.tasks = tasks;

        // Workers return to the roster (the delegation tools still hold
        // clones of the Arc, so drain rather than unwrap); the manager's
        // usage is folded in.
        self.agents = workers.lock().drain(..).collect();
        self.extra_usage.add_usage_metrics(&manager.usage_metrics);

        self.build_output(run?)
    }

    // -- output -------------------------------------------------------------

    fn record_execution(&mut self, task: &Task, output: &TaskOutput) {
        let mut entry = HashMap::new();
        entry.insert("task_id".to_string(), Value::String(task.id.to_string()));
        entry.insert(
            "description".to_string(),
            Value::String(task.description.clone()),
        );
        entry.insert("agent".to_string(), Value::String(output.agent.clone()));
        entry.insert("raw".to_string(), Value::String(output.raw.clone()));
        entry.insert(
            "timestamp".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        self.execution_logs.push(entry);
    }

    /// Sum usage across the roster plus manager/async extras.
    pub fn calculate_usage_metrics(&self) -> UsageMetrics {
        let mut total = UsageMetrics::new();
        for agent in &self.agents {
            total.add_usage_metrics(&agent.usage_metrics);
        }
        total.add_usage_metrics(&self.extra_usage);
        total
    }

    fn build_output(&mut self, outputs: Vec<TaskOutput>) -> Result<CrewOutput, TroupeError> {
        if outputs.is_empty() {
            return Err(TroupeError::Task(
                "no task outputs available to create crew output".into(),
            ));
        }
        let final_output = outputs
            .iter()
            .rev()
            .find(|o| !o.raw.is_empty())
            .ok_or_else(|| {
                TroupeError::Task("no non-empty task outputs available".into())
            })?;

        let token_usage = self.calculate_usage_metrics();
        Ok(CrewOutput {
            raw: final_output.raw.clone(),
            pydantic: final_output.pydantic.clone(),
            json_dict: final_output.json_dict.clone(),
            tasks_output: outputs.clone(),
            token_usage,
        })
    }

    // -- memories -----------------------------------------------------------

    /// Reset one memory kind (or everything).
    pub fn reset_memories(&mut self, kind: &str) -> Result<(), TroupeError> {
        if !RESET_KINDS.contains(&kind) {
            return Err(TroupeError::config(format!(
                "invalid memory reset kind '{}'; must be one of: {}",
                kind,
                RESET_KINDS.join(", ")
            )));
        }
        match kind {
            "all" => {
                self.short_term_memory = None;
                self.long_term_memory = None;
                self.entity_memory = None;
                self.external_memory = None;
                self.knowledge = None;
                self.execution_logs.clear();
                log::info!("all memories have been reset");
            }
            "short" => self.short_term_memory = None,
            "long" => self.long_term_memory = None,
            "entity" => self.entity_memory = None,
            "external" => self.external_memory = None,
            "knowledge" | "agent_knowledge" => self.knowledge = None,
            "kickoff_outputs" => self.execution_logs.clear(),
            _ => unreachable!("kind validated above"),
        }
        Ok(())
    }
}

impl std::fmt::Display for Crew {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Crew(id={}, process={}, agents={}, tasks={})",
            self.id,
            self.process,
            self.agents.len(),
            self.tasks.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::bus::HandlerId;
    use crate::events::context::scope_depth;
    use crate::events::types::task_events::{TaskCompletedEvent, TaskStartedEvent};
    use crate::llms::providers::MockProvider;
    use once_cell::sync::Lazy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Crew kickoffs emit crew-scoped events; tests that count them take
    // this lock so runs don't interleave on the global bus.
    static KICKOFF_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    fn mock_agent(role: &str, goal: &str, backstory: &str, responses: Vec<&str>) -> Agent {
        Agent::new(role, goal, backstory).with_provider(Arc::new(MockProvider::new(responses)))
    }

    #[test]
    fn sequential_two_task_crew_end_to_end() {
        let _ = env_logger::builder().is_test(true).try_init();
        let _guard = KICKOFF_LOCK.lock();
        let bus = EventBus::global();

        let kickoffs_started = Arc::new(AtomicUsize::new(0));
        let kickoffs_completed = Arc::new(AtomicUsize::new(0));
        let tasks_started = Arc::new(AtomicUsize::new(0));
        let tasks_completed = Arc::new(AtomicUsize::new(0));

        let mut handler_ids: Vec<(&str, HandlerId)> = Vec::new();
        let counter = kickoffs_started.clone();
        handler_ids.push((
            "kickoff_started",
            bus.on::<CrewKickoffStartedEvent>(
                "count-kickoff-started",
                move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                None,
            ),
        ));
        let counter = kickoffs_completed.clone();
        handler_ids.push((
            "kickoff_completed",
            bus.on::<CrewKickoffCompletedEvent>(
                "count-kickoff-completed",
                move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                None,
            ),
        ));
        let counter = tasks_started.clone();
        handler_ids.push((
            "task_started",
            bus.on::<TaskStartedEvent>(
                "count-task-started",
                move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                None,
            ),
        ));
        let counter = tasks_completed.clone();
        handler_ids.push((
            "task_completed",
            bus.on::<TaskCompletedEvent>(
                "count-task-completed",
                move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                None,
            ),
        ));

        let writer = mock_agent(
            "writer",
            "write",
            "expert",
            vec!["Thought: drafting\nFinal Answer: Rust intro paragraph"],
        );
        let critic = mock_agent(
            "critic",
            "review",
            "strict",
            vec!["Thought: reviewing\nFinal Answer: - tighten the opening"],
        );

        let t1 = Task::new("Draft an intro about {topic}", "one paragraph").with_agent("writer");
        let t2 = Task::new("Critique the intro", "bullet list").with_agent("critic");

        let mut crew = Crew::new(vec![t1, t2], vec![writer, critic]);
        let mut inputs = HashMap::new();
        inputs.insert("topic".to_string(), "Rust".to_string());

        let output = crew.kickoff(Some(inputs)).unwrap();

        assert_eq!(crew.tasks[0].description, "Draft an intro about Rust");
        assert_eq!(output.tasks_output.len(), 2);
        assert_eq!(output.raw, "- tighten the opening");
        assert_eq!(output.raw, output.tasks_output[1].raw);
        assert_eq!(output.tasks_output[0].agent, "writer");
        assert_eq!(output.tasks_output[1].agent, "critic");
        // Usage aggregated across both agents: one call each.
        assert_eq!(output.token_usage.successful_requests, 2);
        // The kickoff's scopes are balanced on the emitting thread.
        assert_eq!(scope_depth(), 0);

        bus.flush();
        assert_eq!(kickoffs_started.load(Ordering::SeqCst), 1);
        assert_eq!(kickoffs_completed.load(Ordering::SeqCst), 1);
        assert_eq!(tasks_started.load(Ordering::SeqCst), 2);
        assert_eq!(tasks_completed.load(Ordering::SeqCst), 2);

        for (kind, id) in handler_ids {
            match kind {
                "kickoff_started" => bus.off::<CrewKickoffStartedEvent>(&id),
                "kickoff_completed" => bus.off::<CrewKickoffCompletedEvent>(&id),
                "task_started" => bus.off::<TaskStartedEvent>(&id),
                "task_completed" => bus.off::<TaskCompletedEvent>(&id),
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn context_threads_previous_outputs_forward() {
        let _guard = KICKOFF_LOCK.lock();
        let first = mock_agent(
            "first",
            "produce",
            "b",
            vec!["Thought: ok\nFinal Answer: FIRST OUTPUT"],
        );
        let second = mock_agent(
            "second",
            "consume",
            "b",
            vec!["Thought: ok\nFinal Answer: consumed"],
        );

        let t1 = Task::new("produce", "text").with_agent("first");
        let t2 = Task::new("consume", "text").with_agent("second");
        let mut crew = Crew::new(vec![t1, t2], vec![first, second]);

        crew.kickoff(None).unwrap();

        // The second task's transcript carries the first task's output as
        // context.
        let transcript = &crew.agents[1].last_messages;
        let user_message = transcript[1]["content"].as_str().unwrap();
        assert!(user_message.contains("FIRST OUTPUT"));
        assert!(user_message.contains("context you're working with"));
    }

    #[test]
    fn async_tasks_join_before_the_dependent_task() {
        let _guard = KICKOFF_LOCK.lock();
        let background = mock_agent(
            "background",
            "produce",
            "b",
            vec!["Thought: ok\nFinal Answer: ASYNC RESULT"],
        );
        let closer = mock_agent(
            "closer",
            "finish",
            "b",
            vec!["Thought: ok\nFinal Answer: closed"],
        );

        let mut t1 = Task::new("background work", "text").with_agent("background");
        t1.async_execution = true;
        let t2 = Task::new("final work", "text").with_agent("closer");

        let mut crew = Crew::new(vec![t1, t2], vec![background, closer]);
        let output = crew.kickoff(None).unwrap();

        assert_eq!(output.tasks_output.len(), 2);
        assert_eq!(output.tasks_output[0].raw, "ASYNC RESULT");
        assert_eq!(output.raw, "closed");
        // The dependent task saw the async output as context.
        let transcript = &crew.agents[1].last_messages;
        assert!(transcript[1]["content"]
            .as_str()
            .unwrap()
            .contains("ASYNC RESULT"));
    }

    #[test]
    fn hierarchical_manager_delegates_to_workers() {
        let _guard = KICKOFF_LOCK.lock();
        // The manager first delegates, then closes with a final answer.
        let manager = Agent::new("m", "manage", "pm").with_provider(Arc::new(
            MockProvider::with_values(vec![
                MockProvider::tool_call_response(
                    "call_1",
                    "delegate_work_to_coworker",
                    serde_json::json!({
                        "task": "write the summary",
                        "context": "keep it short",
                        "coworker": "specialist"
                    }),
                ),
                serde_json::Value::String("manager synthesis of: WORKER SAYS HI".into()),
            ]),
        ));
        let specialist = mock_agent(
            "specialist",
            "do the work",
            "b",
            vec!["Thought: ok\nFinal Answer: WORKER SAYS HI"],
        );

        let task = Task::new("summarize", "a summary");
        let mut crew = Crew::new(vec![task], vec![specialist])
            .with_process(Process::Hierarchical);
        crew.manager_agent = Some(manager);

        let output = crew.kickoff(None).unwrap();
        assert!(output.raw.contains("WORKER SAYS HI"));
        // The roster survives the run, with the worker's usage counted.
        assert_eq!(crew.agents.len(), 1);
        let usage = crew.calculate_usage_metrics();
        // Worker made one call, the manager two.
        assert_eq!(usage.successful_requests, 3);
    }

    #[test]
    fn callbacks_rewrite_inputs_and_output() {
        let _guard = KICKOFF_LOCK.lock();
        let agent = mock_agent(
            "a",
            "g",
            "b",
            vec!["Thought: ok\nFinal Answer: plain answer"],
        );
        let task = Task::new("about {topic}", "text").with_agent("a");
        let mut crew = Crew::new(vec![task], vec![agent]);

        crew.before_kickoff_callbacks.push(Box::new(|inputs| {
            let mut inputs = inputs.unwrap_or_default();
            inputs.insert("topic".to_string(), "injected".to_string());
            Some(inputs)
        }));
        crew.after_kickoff_callbacks.push(Box::new(|mut output| {
            output.raw = format!("[wrapped] {}", output.raw);
            output
        }));

        let output = crew.kickoff(None).unwrap();
        assert_eq!(crew.tasks[0].description, "about injected");
        assert_eq!(output.raw, "[wrapped] plain answer");
    }

    #[test]
    fn empty_crews_fail_fast() {
        let _guard = KICKOFF_LOCK.lock();
        let mut no_agents = Crew::new(vec![Task::new("d", "e")], vec![]);
        assert!(matches!(
            no_agents.kickoff(None),
            Err(TroupeError::Config(_))
        ));

        let mut no_tasks = Crew::new(vec![], vec![mock_agent("a", "g", "b", vec!["x"])]);
        assert!(matches!(no_tasks.kickoff(None), Err(TroupeError::Config(_))));
    }

    #[test]
    fn unknown_task_assignment_is_a_config_error() {
        let _guard = KICKOFF_LOCK.lock();
        let agent = mock_agent("real", "g", "b", vec!["Thought: ok\nFinal Answer: x"]);
        let task = Task::new("d", "e").with_agent("ghost");
        let mut crew = Crew::new(vec![task], vec![agent]);
        assert!(matches!(crew.kickoff(None), Err(TroupeError::Config(_))));
    }

    #[test]
    fn key_combines_agent_and_task_keys() {
        let crew_a = Crew::new(
            vec![Task::new("d", "e")],
            vec![Agent::new("r", "g", "b")],
        );
        let crew_b = Crew::new(
            vec![Task::new("d", "e")],
            vec![Agent::new("r", "g", "b")],
        );
        // Same configuration, same key, despite distinct ids.
        assert_eq!(crew_a.key(), crew_b.key());

        let crew_c = Crew::new(
            vec![Task::new("different", "e")],
            vec![Agent::new("r", "g", "b")],
        );
        assert_ne!(crew_a.key(), crew_c.key());
    }

    #[test]
    fn copy_resets_identity_and_logs() {
        let mut crew = Crew::new(
            vec![Task::new("d", "e")],
            vec![Agent::new("r", "g", "b")],
        );
        crew.execution_logs.push(HashMap::new());

        let copied = crew.copy();
        assert_ne!(copied.id, crew.id);
        assert!(copied.execution_logs.is_empty());
        assert_eq!(copied.tasks.len(), 1);
        assert_eq!(copied.agents.len(), 1);
    }

    #[test]
    fn reset_memories_validates_the_kind() {
        let mut crew = Crew::new(
            vec![Task::new("d", "e")],
            vec![Agent::new("r", "g", "b")],
        );
        crew.short_term_memory = Some(serde_json::json!({"slot": 1}));
        crew.knowledge = Some(serde_json::json!({"k": 1}));
        crew.execution_logs.push(HashMap::new());

        assert!(crew.reset_memories("bogus").is_err());

        crew.reset_memories("short").unwrap();
        assert!(crew.short_term_memory.is_none());
        assert!(crew.knowledge.is_some());

        crew.reset_memories("all").unwrap();
        assert!(crew.knowledge.is_none());
        assert!(crew.execution_logs.is_empty());
    }

    #[test]
    fn kickoff_for_each_runs_fresh_copies() {
        let _guard = KICKOFF_LOCK.lock();
        let agent = Agent::new("a", "g", "b").with_provider(Arc::new(MockProvider::new(vec![
            "Thought: ok\nFinal Answer: same answer",
        ])));
        let task = Task::new("about {topic}", "text").with_agent("a");
        let crew = Crew::new(vec![task], vec![agent]);

        let mut inputs_a = HashMap::new();
        inputs_a.insert("topic".to_string(), "one".to_string());
        let mut inputs_b = HashMap::new();
        inputs_b.insert("topic".to_string(), "two".to_string());

        let results = crew.kickoff_for_each(vec![inputs_a, inputs_b]);
        assert_eq!(results.len(), 2);
        for result in results {
            assert_eq!(result.unwrap().raw, "same answer");
        }
    }
}
