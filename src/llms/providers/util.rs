//! Helpers shared by the native providers: tool schema extraction and
//! function-name hygiene.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::errors::TroupeError;

static VALID_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("literal regex"));
static INVALID_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_]").expect("literal regex"));
static UNDERSCORE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").expect("literal regex"));

/// Validate a function name against the rules common to every provider:
/// non-empty, starts with a letter or underscore, at most 64 chars, only
/// lowercase letters, digits, and underscores.
pub fn validate_function_name(name: &str, provider: &str) -> Result<String, TroupeError> {
    if name.is_empty() {
        return Err(TroupeError::provider(format!(
            "{provider} function name cannot be empty"
        )));
    }
    if name.len() > 64 {
        return Err(TroupeError::provider(format!(
            "{provider} function name '{name}' exceeds the 64 character limit"
        )));
    }
    if !VALID_NAME.is_match(name) {
        return Err(TroupeError::provider(format!(
            "{provider} function name '{name}' must match [a-z_][a-z0-9_]*"
        )));
    }
    Ok(name.to_string())
}

/// Coerce an arbitrary name into provider-safe form: lowercase, invalid
/// characters to underscores, collapsed runs, no trailing underscore,
/// leading underscore when the first char is not a letter, 64-char cap.
pub fn sanitize_function_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    let mut out = INVALID_CHARS
        .replace_all(&name.to_lowercase(), "_")
        .into_owned();
    out = UNDERSCORE_RUNS.replace_all(&out, "_").into_owned();
    out = out.trim_end_matches('_').to_string();
    if let Some(first) = out.chars().next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            out.insert(0, '_');
        }
    }
    out.truncate(64);
    out
}

/// Pull `(name, description, parameters)` out of a tool schema, accepting
/// both the nested OpenAI form (`{"type": "function", "function": {...}}`)
/// and the direct form (`{"name": ..., "parameters": ...}`).
pub fn extract_tool_info(tool: &Value) -> Result<(String, String, Value), TroupeError> {
    let obj = tool
        .as_object()
        .ok_or_else(|| TroupeError::provider("tool must be a JSON object"))?;

    let source = match obj.get("function") {
        Some(function) => function
            .as_object()
            .ok_or_else(|| TroupeError::provider("tool 'function' must be a JSON object"))?,
        None => obj,
    };

    let name = source
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let description = source
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let parameters = source
        .get("parameters")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    Ok((name, description, parameters))
}

/// Extract, sanitize, and validate in one step. The path every provider
/// takes before emitting a tool definition on the wire.
pub fn safe_tool_conversion(
    tool: &Value,
    provider: &str,
) -> Result<(String, String, Value), TroupeError> {
    let (name, description, parameters) = extract_tool_info(tool)?;
    let name = validate_function_name(&sanitize_function_name(&name), provider)?;
    Ok((name, description, parameters))
}
