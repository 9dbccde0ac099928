//! Axum route handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::store::{MemoryStore, OutputStore};
use crate::agent::Agent;
use crate::crew::Crew;
use crate::task::Task;
use crate::types::usage_metrics::UsageMetrics;

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// Where crew outputs are persisted.
    pub store: Arc<dyn OutputStore>,
}

impl AppState {
    /// State backed by the in-memory store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// State over a custom store.
    pub fn with_store(store: Arc<dyn OutputStore>) -> Self {
        Self { store }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/execute", post(execute_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "troupe",
    }))
}

/// A single-agent task delegation.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    /// Agent persona.
    pub role: String,
    pub goal: String,
    pub backstory: String,
    /// Provider identifier; server-side default applies when absent.
    pub llm: Option<String>,
    /// The work.
    pub task_description: String,
    pub expected_output: String,
    /// Interpolation inputs.
    pub inputs: Option<HashMap<String, String>>,
}

/// The structured result.
#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub crew_id: String,
    pub raw: String,
    pub token_usage: UsageMetrics,
}

/// POST /execute — wrap the delegation in a one-task crew and run it on a
/// blocking thread (kickoff is synchronous by design).
async fn execute_handler(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, (StatusCode, Json<Value>)> {
    let mut agent = Agent::new(request.role.clone(), request.goal, request.backstory);
    agent.llm = request.llm;

    let task = Task::new(request.task_description, request.expected_output)
        .with_agent(request.role);
    let mut crew = Crew::new(vec![task], vec![agent]);
    let crew_id = crew.id.to_string();
    let inputs = request.inputs;

    let result = tokio::task::spawn_blocking(move || {
        let output = crew.kickoff(inputs)?;
        Ok::<_, crate::errors::TroupeError>(output)
    })
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("execution task failed: {e}")})),
        )
    })?;

    match result {
        Ok(output) => {
            state.store.save(&crew_id, &output);
            Ok(Json(ExecuteResponse {
                crew_id,
                raw: output.raw,
                token_usage: output.token_usage,
            }))
        }
        Err(error) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({"error": error.to_string()})),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_ok() {
        let app = app_router(AppState::new());
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "troupe");
    }
}
