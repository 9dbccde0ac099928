//! Read a named input file into the conversation. Backs the task-level
//! `input_files` map.

use std::collections::HashMap;

use serde_json::Value;

use crate::errors::TroupeError;
use crate::tools::Tool;

/// Resolves reference names to paths and returns file contents.
pub struct ReadFileTool {
    /// Reference name → path, from the task's `input_files`.
    files: HashMap<String, String>,
}

impl ReadFileTool {
    pub fn new(files: HashMap<String, String>) -> Self {
        Self { files }
    }
}

impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "Read input file"
    }

    fn description(&self) -> &str {
        "Read one of the task's named input files and return its contents."
    }

    fn args_schema(&self) -> Value {
        let names: Vec<&str> = self.files.keys().map(String::as_str).collect();
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Reference name of the input file",
                    "enum": names,
                }
            },
            "required": ["name"]
        })
    }

    fn run(&self, args: &Value) -> Result<String, TroupeError> {
        let name = args.get("name").and_then(Value::as_str).unwrap_or_default();
        let path = self.files.get(name).ok_or_else(|| TroupeError::Tool {
            name: "read_input_file".into(),
            message: format!(
                "no input file named '{}'; known names: {}",
                name,
                self.files.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        })?;

        std::fs::read_to_string(path).map_err(|e| TroupeError::Tool {
            name: "read_input_file".into(),
            message: format!("failed to read '{}': {}", path, e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_registered_files_by_reference_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "report body").unwrap();

        let mut files = HashMap::new();
        files.insert(
            "report".to_string(),
            file.path().to_string_lossy().into_owned(),
        );
        let tool = ReadFileTool::new(files);

        let output = tool.run(&serde_json::json!({"name": "report"})).unwrap();
        assert!(output.contains("report body"));

        assert!(tool.run(&serde_json::json!({"name": "other"})).is_err());
    }
}
