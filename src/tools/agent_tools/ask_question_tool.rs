//! Ask a coworker a question and return their answer. Same plumbing as
//! delegation, different framing for the model.

use serde_json::Value;

use super::delegate_work_tool::CoworkerExecutor;
use super::sanitize_agent_name;
use crate::errors::TroupeError;
use crate::tools::Tool;

pub struct AskQuestionTool {
    coworker_names: Vec<String>,
    executor: CoworkerExecutor,
}

impl AskQuestionTool {
    pub fn new(coworker_names: Vec<String>, executor: CoworkerExecutor) -> Self {
        Self {
            coworker_names,
            executor,
        }
    }
}

impl Tool for AskQuestionTool {
    fn name(&self) -> &str {
        "Ask question to coworker"
    }

    fn description(&self) -> &str {
        "Ask one of your coworkers a specific question. Provide the question, all relevant context, and the coworker's exact role."
    }

    fn args_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {"type": "string", "description": "The question to ask"},
                "context": {"type": "string", "description": "Everything the coworker needs to know"},
                "coworker": {"type": "string", "description": "The role/name of the coworker"}
            },
            "required": ["question", "context", "coworker"]
        })
    }

    fn cacheable(&self) -> bool {
        false
    }

    fn run(&self, args: &Value) -> Result<String, TroupeError> {
        let question = args
            .get("question")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let context = args.get("context").and_then(Value::as_str).unwrap_or_default();
        let requested = args
            .get("coworker")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let wanted = sanitize_agent_name(requested);
        let coworker = self
            .coworker_names
            .iter()
            .find(|name| sanitize_agent_name(name) == wanted)
            .cloned()
            .ok_or_else(|| TroupeError::Tool {
                name: "ask_question_to_coworker".into(),
                message: format!("coworker '{}' not found", requested),
            })?;

        (self.executor)(&coworker, question, context)
    }
}
