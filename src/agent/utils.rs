//! Helpers shared by the agent's execution entry points.

use crate::errors::TroupeError;

/// `max_execution_time` must be a positive number of seconds when set.
pub fn validate_max_execution_time(max_execution_time: Option<i64>) -> Result<(), TroupeError> {
    match max_execution_time {
        Some(t) if t <= 0 => Err(TroupeError::config(
            "max_execution_time must be a positive integer greater than zero",
        )),
        _ => Ok(()),
    }
}

/// Attach the context block the task carries into the prompt.
pub fn format_task_with_context(task_prompt: &str, context: Option<&str>) -> String {
    match context {
        Some(ctx) if !ctx.is_empty() => format!(
            "{}\n\nThis is the context you're working with:\n{}",
            task_prompt, ctx
        ),
        _ => task_prompt.to_string(),
    }
}

/// Merge task tools over agent tools, dropping duplicates by name.
pub fn merge_tool_names(agent_tools: &[String], task_tools: &[String]) -> Vec<String> {
    let mut merged = agent_tools.to_vec();
    for tool in task_tools {
        if !merged.contains(tool) {
            merged.push(tool.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_time_bounds() {
        assert!(validate_max_execution_time(None).is_ok());
        assert!(validate_max_execution_time(Some(30)).is_ok());
        assert!(validate_max_execution_time(Some(0)).is_err());
        assert!(validate_max_execution_time(Some(-5)).is_err());
    }

    #[test]
    fn context_block_is_optional() {
        assert_eq!(format_task_with_context("do it", None), "do it");
        assert_eq!(format_task_with_context("do it", Some("")), "do it");
        let formatted = format_task_with_context("do it", Some("prior output"));
        assert!(formatted.contains("context you're working with"));
        assert!(formatted.contains("prior output"));
    }

    #[test]
    fn tool_merge_deduplicates() {
        let merged = merge_tool_names(
            &["a".to_string(), "b".to_string()],
            &["b".to_string(), "c".to_string()],
        );
        assert_eq!(merged, vec!["a", "b", "c"]);
    }
}
