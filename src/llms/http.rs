//! Shared HTTP plumbing for provider calls: the retry policy and the
//! request loop every provider funnels through.
//!
//! Retry semantics, identical across providers: up to `max_retries + 1`
//! attempts; exponential backoff starting at one second and doubling;
//! retry on network errors, 429, any 5xx, and 529 (Anthropic overload);
//! honor `Retry-After` when the server sends one; never retry another
//! 4xx. The request is rebuilt on every attempt so signed requests get a
//! fresh timestamp.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::errors::TroupeError;

/// Retry configuration shared by the providers.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 2 means three attempts total.
    pub max_retries: u32,
    /// First backoff delay; doubles each retry.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy with a given retry count and the standard 1s backoff.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status.as_u16() == 529
        || status.is_server_error()
}

/// Send a provider request until it succeeds, the retry budget runs out,
/// or a non-retryable status arrives. `build` is invoked once per attempt
/// so callers can re-sign.
///
/// Returns the response body on 2xx. A non-429 4xx is returned immediately
/// as a permanent [`TroupeError::Provider`] carrying the body.
pub async fn send_with_retries(
    policy: &RetryPolicy,
    label: &str,
    mut build: impl FnMut() -> Result<reqwest::RequestBuilder, TroupeError>,
) -> Result<String, TroupeError> {
    let mut delay = policy.initial_backoff;
    let mut last_error: Option<String> = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            log::warn!("{} retry attempt {} after {:?}", label, attempt, delay);
            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        let request = build()?;
        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                last_error = Some(format!("{} network error: {e}", label));
                continue;
            }
        };

        let status = response.status();
        if is_retryable_status(status) {
            // A Retry-After header overrides the computed backoff for the
            // next attempt.
            if let Some(after) = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
            {
                delay = Duration::from_secs(after);
            }
            last_error = Some(format!("{} transient error: HTTP {}", label, status));
            continue;
        }

        let body = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                last_error = Some(format!("{} body read error: {e}", label));
                continue;
            }
        };

        if status.is_client_error() {
            return Err(TroupeError::provider(format!(
                "{} error ({}): {}",
                label, status, body
            )));
        }

        return Ok(body);
    }

    Err(TroupeError::provider(last_error.unwrap_or_else(|| {
        format!("{} call failed after all retries", label)
    })))
}

/// [`send_with_retries`] plus JSON parsing. A malformed body is a
/// permanent error: the call already succeeded at the HTTP level.
pub async fn send_json_with_retries(
    policy: &RetryPolicy,
    label: &str,
    build: impl FnMut() -> Result<reqwest::RequestBuilder, TroupeError>,
) -> Result<Value, TroupeError> {
    let body = send_with_retries(policy, label, build).await?;
    serde_json::from_str(&body).map_err(|e| {
        TroupeError::provider(format!(
            "failed to parse {} response: {} - body: {}",
            label,
            e,
            &body[..body.len().min(500)]
        ))
    })
}

/// Build a `reqwest` client with the given timeout in seconds.
pub fn client_with_timeout(timeout_secs: f64) -> Result<reqwest::Client, TroupeError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs_f64(timeout_secs))
        .build()
        .map_err(|e| TroupeError::provider(format!("failed to build HTTP client: {e}")))
}

/// Pull a usage sub-object out of a response into a flat map the shared
/// [`crate::llms::base::ProviderState::record_usage`] understands.
pub fn usage_map(usage: &Value) -> HashMap<String, Value> {
    usage
        .as_object()
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_status_classification() {
        assert!(is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(
            reqwest::StatusCode::from_u16(529).unwrap()
        ));
        assert!(!is_retryable_status(reqwest::StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(reqwest::StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(reqwest::StatusCode::OK));
    }

    #[tokio::test]
    async fn zero_retries_surfaces_first_transient_error() {
        // Nothing listens on this port; the connection error must surface
        // after exactly one attempt when max_retries is 0.
        let policy = RetryPolicy::with_max_retries(0);
        let client = reqwest::Client::new();
        let mut attempts = 0u32;
        let result = send_with_retries(&policy, "test", || {
            attempts += 1;
            Ok(client.post("http://127.0.0.1:9/unreachable"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[test]
    fn usage_map_flattens_objects() {
        let usage = serde_json::json!({"prompt_tokens": 5, "completion_tokens": 7});
        let map = usage_map(&usage);
        assert_eq!(map["prompt_tokens"], serde_json::json!(5));
        assert_eq!(map.len(), 2);

        assert!(usage_map(&serde_json::json!(null)).is_empty());
    }
}
