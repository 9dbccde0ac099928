//! Delegation: hand a task to a named coworker and return their answer.

use std::sync::Arc;

use serde_json::Value;

use super::sanitize_agent_name;
use crate::errors::TroupeError;
use crate::tools::Tool;

/// Callback the crew installs to actually run a coworker:
/// `(coworker role, task, context) -> answer`.
pub type CoworkerExecutor =
    Arc<dyn Fn(&str, &str, &str) -> Result<String, TroupeError> + Send + Sync>;

/// Lets a manager (or any delegating agent) assign a task to a coworker.
pub struct DelegateWorkTool {
    coworker_names: Vec<String>,
    executor: CoworkerExecutor,
}

impl DelegateWorkTool {
    pub fn new(coworker_names: Vec<String>, executor: CoworkerExecutor) -> Self {
        Self {
            coworker_names,
            executor,
        }
    }

    fn resolve_coworker(&self, requested: &str) -> Result<String, TroupeError> {
        let wanted = sanitize_agent_name(requested);
        self.coworker_names
            .iter()
            .find(|name| sanitize_agent_name(name) == wanted)
            .cloned()
            .ok_or_else(|| {
                let available = self
                    .coworker_names
                    .iter()
                    .map(|n| format!("- {}", n))
                    .collect::<Vec<_>>()
                    .join("\n");
                TroupeError::Tool {
                    name: "delegate_work_to_coworker".into(),
                    message: format!(
                        "coworker '{}' not found; available coworkers:\n{}",
                        requested, available
                    ),
                }
            })
    }
}

impl Tool for DelegateWorkTool {
    fn name(&self) -> &str {
        "Delegate work to coworker"
    }

    fn description(&self) -> &str {
        "Delegate a specific task to one of your coworkers. Provide the task, all the context the coworker needs, and the coworker's exact role."
    }

    fn args_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": {"type": "string", "description": "The task to delegate"},
                "context": {"type": "string", "description": "Everything the coworker needs to know"},
                "coworker": {"type": "string", "description": "The role/name of the coworker"}
            },
            "required": ["task", "context", "coworker"]
        })
    }

    fn cacheable(&self) -> bool {
        false
    }

    fn run(&self, args: &Value) -> Result<String, TroupeError> {
        let task = args.get("task").and_then(Value::as_str).unwrap_or_default();
        let context = args.get("context").and_then(Value::as_str).unwrap_or_default();
        let requested = args
            .get("coworker")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let coworker = self.resolve_coworker(requested)?;
        (self.executor)(&coworker, task, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> DelegateWorkTool {
        DelegateWorkTool::new(
            vec!["Senior Writer".into(), "Critic".into()],
            Arc::new(|coworker, task, _context| Ok(format!("{coworker} did: {task}"))),
        )
    }

    #[test]
    fn delegates_to_a_known_coworker_case_insensitively() {
        let output = tool()
            .run(&serde_json::json!({
                "task": "draft the intro",
                "context": "audience is engineers",
                "coworker": "senior writer"
            }))
            .unwrap();
        assert_eq!(output, "Senior Writer did: draft the intro");
    }

    #[test]
    fn unknown_coworker_lists_the_roster() {
        let err = tool()
            .run(&serde_json::json!({
                "task": "x", "context": "y", "coworker": "Nobody"
            }))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("not found"));
        assert!(message.contains("Senior Writer"));
        assert!(message.contains("Critic"));
    }
}
