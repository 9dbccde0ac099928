//! Guardrails: predicates over a candidate final answer.
//!
//! A guardrail either passes the answer through or rejects it with
//! feedback; the executor then re-prompts the model with that feedback,
//! up to `guardrail_max_retries` times. Guardrails come in two forms: a
//! native function, or a description evaluated by an LLM.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TroupeError;
use crate::llm::Llm;
use crate::llms::base::{LlmMessage, ProviderState};

/// Outcome of one guardrail evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    /// Whether the answer was accepted.
    pub passed: bool,
    /// Rejection feedback, used to re-prompt the model.
    pub feedback: Option<String>,
}

impl GuardrailVerdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            feedback: None,
        }
    }

    pub fn fail(feedback: impl Into<String>) -> Self {
        Self {
            passed: false,
            feedback: Some(feedback.into()),
        }
    }
}

/// A guardrail implemented as a native predicate.
pub type GuardrailFn = Arc<dyn Fn(&str) -> GuardrailVerdict + Send + Sync>;

/// A guardrail attached to an agent or task.
#[derive(Clone)]
pub enum Guardrail {
    /// Native predicate with a human description.
    Function {
        description: String,
        check: GuardrailFn,
    },
    /// Description judged by a model.
    Llm(LlmGuardrail),
}

impl Guardrail {
    /// Native guardrail from a closure.
    pub fn function(
        description: impl Into<String>,
        check: impl Fn(&str) -> GuardrailVerdict + Send + Sync + 'static,
    ) -> Self {
        Self::Function {
            description: description.into(),
            check: Arc::new(check),
        }
    }

    /// Human description shown in events and logs.
    pub fn describe(&self) -> &str {
        match self {
            Guardrail::Function { description, .. } => description,
            Guardrail::Llm(guardrail) => &guardrail.description,
        }
    }

    /// Evaluate the guardrail against a candidate answer.
    pub fn evaluate(&self, output: &str) -> Result<GuardrailVerdict, TroupeError> {
        match self {
            Guardrail::Function { check, .. } => Ok(check(output)),
            Guardrail::Llm(guardrail) => guardrail.evaluate(output),
        }
    }
}

impl std::fmt::Debug for Guardrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Guardrail({})", self.describe())
    }
}

/// Validates an answer against a described criterion by asking a model.
#[derive(Debug, Clone)]
pub struct LlmGuardrail {
    /// The validation criterion, in plain language.
    pub description: String,
    /// Model used for validation.
    pub llm: Llm,
}

impl LlmGuardrail {
    pub fn new(description: impl Into<String>, llm: Llm) -> Self {
        Self {
            description: description.into(),
            llm,
        }
    }

    fn validation_messages(&self, output: &str) -> Vec<LlmMessage> {
        let prompt = format!(
            "Ensure the following task result complies with the given guardrail.\n\n\
             Task result:\n{}\n\n\
             Guardrail:\n{}\n\n\
             Respond with a JSON object of the form \
             {{\"valid\": true|false, \"feedback\": \"...\"}}. \
             Set feedback only when the result is not valid, explaining what is wrong.",
            output, self.description
        );
        ProviderState::string_to_messages(&prompt)
    }

    /// Ask the model for a verdict. A response that cannot be parsed into
    /// the verdict shape is an evaluation failure, not a rejection.
    pub fn evaluate(&self, output: &str) -> Result<GuardrailVerdict, TroupeError> {
        let response = self.llm.call(self.validation_messages(output), None)?;
        let text = match &response {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let parsed = ProviderState::validate_structured_output(&text).map_err(|_| {
            TroupeError::Guardrail(format!(
                "guardrail validator returned no parseable verdict: {}",
                &text[..text.len().min(200)]
            ))
        })?;

        let valid = parsed.get("valid").and_then(Value::as_bool).unwrap_or(false);
        if valid {
            Ok(GuardrailVerdict::pass())
        } else {
            let feedback = parsed
                .get("feedback")
                .and_then(Value::as_str)
                .unwrap_or("output rejected by guardrail")
                .to_string();
            Ok(GuardrailVerdict::fail(feedback))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_guardrails_evaluate_directly() {
        let guardrail = Guardrail::function("must mention rust", |output| {
            if output.to_lowercase().contains("rust") {
                GuardrailVerdict::pass()
            } else {
                GuardrailVerdict::fail("the answer must mention Rust")
            }
        });

        assert!(guardrail.evaluate("Rust is great").unwrap().passed);
        let verdict = guardrail.evaluate("Go is fine").unwrap();
        assert!(!verdict.passed);
        assert!(verdict.feedback.unwrap().contains("Rust"));
        assert_eq!(guardrail.describe(), "must mention rust");
    }

    #[test]
    fn llm_guardrail_builds_a_verdict_prompt() {
        let guardrail = LlmGuardrail::new("answer must be a haiku", Llm::new("gpt-4o"));
        let messages = guardrail.validation_messages("some output");
        let content = messages[0]["content"].as_str().unwrap();
        assert!(content.contains("some output"));
        assert!(content.contains("answer must be a haiku"));
        assert!(content.contains("\"valid\""));
    }
}
