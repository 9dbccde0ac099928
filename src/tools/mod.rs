//! The tool contract and registry.
//!
//! A tool is a named, invocable side effect the model can request. The
//! registry resolves names (tolerating the sanitized forms providers
//! enforce), renders OpenAI-shaped schemas for native tool calling, and
//! renders the text block ReAct prompts embed.

pub mod agent_tools;
pub mod cache;

use std::sync::Arc;

use serde_json::Value;

use crate::errors::TroupeError;
use crate::llms::providers::util::sanitize_function_name;

pub use cache::ToolCache;

/// Implemented by anything the model may invoke.
pub trait Tool: Send + Sync {
    /// Tool name as shown to the model.
    fn name(&self) -> &str;

    /// One-line description embedded in prompts and schemas.
    fn description(&self) -> &str;

    /// JSON schema of the arguments. Defaults to an empty object schema.
    fn args_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    /// When true, the tool's output becomes the agent's final answer and
    /// the loop short-circuits.
    fn result_as_answer(&self) -> bool {
        false
    }

    /// Whether results may be served from the tool cache.
    fn cacheable(&self) -> bool {
        true
    }

    /// Invoke the tool with parsed arguments.
    fn run(&self, args: &Value) -> Result<String, TroupeError>;
}

/// A tool built from a closure. The cheapest way to hand an agent custom
/// behaviour, and what most tests use.
pub struct FunctionTool {
    name: String,
    description: String,
    schema: Value,
    result_as_answer: bool,
    body: Arc<dyn Fn(&Value) -> Result<String, TroupeError> + Send + Sync>,
}

impl FunctionTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        body: impl Fn(&Value) -> Result<String, TroupeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: serde_json::json!({"type": "object", "properties": {}}),
            result_as_answer: false,
            body: Arc::new(body),
        }
    }

    /// Attach an argument schema.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Mark the tool's output as the final answer.
    pub fn with_result_as_answer(mut self, result_as_answer: bool) -> Self {
        self.result_as_answer = result_as_answer;
        self
    }
}

impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn args_schema(&self) -> Value {
        self.schema.clone()
    }

    fn result_as_answer(&self) -> bool {
        self.result_as_answer
    }

    fn run(&self, args: &Value) -> Result<String, TroupeError> {
        (self.body)(args)
    }
}

/// The set of tools available to one execution.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry over the given tools.
    pub fn from_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Add a tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Resolve by exact name, falling back to the sanitized form the
    /// providers put on the wire.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let wanted = name.trim();
        self.tools
            .iter()
            .find(|t| t.name() == wanted)
            .or_else(|| {
                let sanitized = sanitize_function_name(wanted);
                self.tools
                    .iter()
                    .find(|t| sanitize_function_name(t.name()) == sanitized)
            })
            .cloned()
    }

    /// OpenAI-shaped schemas for native tool calling. Names are sanitized
    /// the same way lookup tolerates.
    pub fn to_schemas(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": sanitize_function_name(tool.name()),
                        "description": tool.description(),
                        "parameters": tool.args_schema(),
                    }
                })
            })
            .collect()
    }

    /// The `- name: description` block ReAct prompts embed.
    pub fn descriptions_block(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_tolerates_sanitized_names() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FunctionTool::new(
            "Delegate work to coworker",
            "Hand a task to another agent",
            |_| Ok("done".into()),
        )));

        assert!(registry.get("Delegate work to coworker").is_some());
        assert!(registry.get("delegate_work_to_coworker").is_some());
        assert!(registry.get("unknown_tool").is_none());
    }

    #[test]
    fn schemas_are_openai_shaped_with_sanitized_names() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(
            FunctionTool::new("Read File", "Read a file", |_| Ok(String::new())).with_schema(
                serde_json::json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}},
                    "required": ["path"]
                }),
            ),
        ));

        let schemas = registry.to_schemas();
        assert_eq!(schemas[0]["type"], "function");
        assert_eq!(schemas[0]["function"]["name"], "read_file");
        assert!(schemas[0]["function"]["parameters"]["properties"]
            .get("path")
            .is_some());
    }

    #[test]
    fn descriptions_block_lists_every_tool() {
        let registry = ToolRegistry::from_tools(vec![
            Arc::new(FunctionTool::new("a", "first", |_| Ok(String::new()))),
            Arc::new(FunctionTool::new("b", "second", |_| Ok(String::new()))),
        ]);
        assert_eq!(registry.descriptions_block(), "- a: first\n- b: second");
    }
}
