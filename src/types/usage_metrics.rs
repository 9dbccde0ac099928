//! Token usage accounting.

use serde::{Deserialize, Serialize};

/// Monotone counters for LLM usage, aggregated per provider instance, per
/// agent, and per crew. Counters only ever increase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    /// Total tokens consumed (prompt + completion).
    pub total_tokens: i64,
    /// Tokens spent on prompts.
    pub prompt_tokens: i64,
    /// Prompt tokens served from a provider-side cache.
    pub cached_prompt_tokens: i64,
    /// Tokens spent on completions.
    pub completion_tokens: i64,
    /// Number of calls that returned successfully.
    pub successful_requests: i64,
}

impl UsageMetrics {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold another set of counters into this one.
    pub fn add_usage_metrics(&mut self, other: &UsageMetrics) {
        self.total_tokens += other.total_tokens;
        self.prompt_tokens += other.prompt_tokens;
        self.cached_prompt_tokens += other.cached_prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.successful_requests += other.successful_requests;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregation_only_adds() {
        let mut total = UsageMetrics::new();
        let call = UsageMetrics {
            total_tokens: 150,
            prompt_tokens: 100,
            cached_prompt_tokens: 10,
            completion_tokens: 50,
            successful_requests: 1,
        };
        total.add_usage_metrics(&call);
        total.add_usage_metrics(&call);
        assert_eq!(total.total_tokens, 300);
        assert_eq!(total.prompt_tokens, 200);
        assert_eq!(total.cached_prompt_tokens, 20);
        assert_eq!(total.completion_tokens, 100);
        assert_eq!(total.successful_requests, 2);
    }
}
