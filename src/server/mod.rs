//! HTTP collaborator: a thin server exposing crew execution.
//!
//! Endpoints:
//! - `GET /health` — liveness probe.
//! - `POST /execute` — run a single-agent task delegation and return the
//!   structured result.
//!
//! Environment: `PORT` (default 8080), `TROUPE_STORE` (`memory` default,
//! `postgres` behind the feature), `DATABASE_URL`, `RUST_LOG`.

pub mod routes;
pub mod store;

pub use routes::{app_router, AppState};
pub use store::{MemoryStore, OutputStore};
