//! The troupe HTTP server.
//!
//! # Environment
//!
//! - `PORT` — listen port (default 8080)
//! - `TROUPE_STORE` — `memory` (default) or `postgres`
//! - `DATABASE_URL` — PostgreSQL connection string when
//!   `TROUPE_STORE=postgres`
//! - `RUST_LOG` — tracing filter (default `info`)

use std::sync::Arc;

use troupe::events::bus::EventBus;
use troupe::events::types::system_events::SigIntEvent;
use troupe::server::{app_router, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,troupe=debug".into()),
        )
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_addr = format!("0.0.0.0:{port}");

    let state = build_state().await;

    // Flush the event bus before the process dies.
    ctrlc::set_handler(|| {
        let bus = EventBus::global();
        let mut event = SigIntEvent::new();
        bus.emit(Arc::new(()), &mut event);
        bus.shutdown(true);
        std::process::exit(0);
    })
    .expect("failed to install signal handler");

    let app = app_router(state);

    tracing::info!("troupe server starting on {bind_addr}");
    tracing::info!("  GET  /health  — liveness probe");
    tracing::info!("  POST /execute — single-agent task delegation");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server failed");
}

#[cfg(feature = "postgres")]
async fn build_state() -> AppState {
    use troupe::server::store::pg::PgStore;

    if std::env::var("TROUPE_STORE").as_deref() == Ok("postgres") {
        match std::env::var("DATABASE_URL") {
            Ok(database_url) => {
                tracing::info!("connecting to PostgreSQL");
                match sqlx::PgPool::connect(&database_url).await {
                    Ok(pool) => {
                        let store = PgStore::new(pool, tokio::runtime::Handle::current());
                        if let Err(e) = store.migrate().await {
                            tracing::error!("migrations failed: {e}");
                        }
                        return AppState::with_store(Arc::new(store));
                    }
                    Err(e) => tracing::error!("PostgreSQL connection failed: {e}"),
                }
            }
            Err(_) => tracing::warn!("TROUPE_STORE=postgres but DATABASE_URL is not set"),
        }
    }
    AppState::new()
}

#[cfg(not(feature = "postgres"))]
async fn build_state() -> AppState {
    if std::env::var("TROUPE_STORE").as_deref() == Ok("postgres") {
        tracing::warn!("TROUPE_STORE=postgres requires the 'postgres' feature; using memory store");
    }
    AppState::new()
}
