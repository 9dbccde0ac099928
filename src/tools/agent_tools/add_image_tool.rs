//! Attach a local image to the conversation as an inline data URL. Given
//! to agents with `multimodal` enabled.

use base64::Engine;
use serde_json::Value;

use crate::errors::TroupeError;
use crate::tools::Tool;

pub struct AddImageTool;

fn media_type_for(path: &str) -> &'static str {
    let lower = path.to_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

impl Tool for AddImageTool {
    fn name(&self) -> &str {
        "Add image to content"
    }

    fn description(&self) -> &str {
        "Attach an image file so it becomes part of the conversation content."
    }

    fn args_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "image_path": {"type": "string", "description": "Path to the image file"}
            },
            "required": ["image_path"]
        })
    }

    fn cacheable(&self) -> bool {
        false
    }

    fn run(&self, args: &Value) -> Result<String, TroupeError> {
        let path = args
            .get("image_path")
            .and_then(Value::as_str)
            .ok_or_else(|| TroupeError::Tool {
                name: "add_image_to_content".into(),
                message: "image_path is required".into(),
            })?;

        let bytes = std::fs::read(path).map_err(|e| TroupeError::Tool {
            name: "add_image_to_content".into(),
            message: format!("failed to read '{}': {}", path, e),
        })?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let block = serde_json::json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:{};base64,{}", media_type_for(path), encoded)
            }
        });
        Ok(block.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn encodes_file_as_data_url_block() {
        let mut file = tempfile::NamedTempFile::with_suffix(".png").unwrap();
        file.write_all(&[0x89, 0x50, 0x4e, 0x47]).unwrap();

        let output = AddImageTool
            .run(&serde_json::json!({"image_path": file.path().to_str().unwrap()}))
            .unwrap();
        let block: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(block["type"], "image_url");
        assert!(block["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn missing_file_is_a_tool_error() {
        let result = AddImageTool.run(&serde_json::json!({"image_path": "/no/such/file.png"}));
        assert!(matches!(result, Err(TroupeError::Tool { .. })));
    }
}
