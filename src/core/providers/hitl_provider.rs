//! Human-in-the-loop pause/resume seam for hosts that suspend execution
//! waiting on external review.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

/// Pauses execution for human input and resumes with the response.
#[async_trait]
pub trait HitlProvider: Send + Sync {
    /// Present `prompt` to a human and return their input.
    async fn request_input(
        &self,
        prompt: &str,
        context: &HashMap<String, Value>,
    ) -> Result<String, anyhow::Error>;

    /// Resume a paused task with the human's input.
    async fn resume_with_input(&self, task_id: &str, input: &str) -> Result<Value, anyhow::Error>;

    /// Whether this provider is active.
    fn is_enabled(&self) -> bool;
}

/// Console default: prompts on stdout, reads stdin.
#[derive(Debug, Default)]
pub struct ConsoleHitlProvider;

#[async_trait]
impl HitlProvider for ConsoleHitlProvider {
    async fn request_input(
        &self,
        prompt: &str,
        _context: &HashMap<String, Value>,
    ) -> Result<String, anyhow::Error> {
        println!("{prompt}");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        Ok(input.trim().to_string())
    }

    async fn resume_with_input(&self, _task_id: &str, input: &str) -> Result<Value, anyhow::Error> {
        Ok(Value::String(input.to_string()))
    }

    fn is_enabled(&self) -> bool {
        true
    }
}
