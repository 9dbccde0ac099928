//! Persistence for crew outputs, keyed by crew id.

use dashmap::DashMap;

use crate::crews::crew_output::CrewOutput;

/// Store contract. The schema of the backing store is external; the core
/// only reads and writes whole outputs.
pub trait OutputStore: Send + Sync {
    /// Persist a crew's output.
    fn save(&self, crew_id: &str, output: &CrewOutput);

    /// Load a crew's output, when present.
    fn load(&self, crew_id: &str) -> Option<CrewOutput>;

    /// Drop everything.
    fn clear(&self);
}

/// In-memory default.
#[derive(Default)]
pub struct MemoryStore {
    outputs: DashMap<String, CrewOutput>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputStore for MemoryStore {
    fn save(&self, crew_id: &str, output: &CrewOutput) {
        self.outputs.insert(crew_id.to_string(), output.clone());
    }

    fn load(&self, crew_id: &str) -> Option<CrewOutput> {
        self.outputs.get(crew_id).map(|entry| entry.clone())
    }

    fn clear(&self) {
        self.outputs.clear();
    }
}

/// PostgreSQL store, selected by `TROUPE_STORE=postgres`.
#[cfg(feature = "postgres")]
pub mod pg {
    use super::*;

    /// Outputs table keyed by crew id, JSONB payload.
    pub struct PgStore {
        pool: sqlx::PgPool,
        runtime: tokio::runtime::Handle,
    }

    impl PgStore {
        pub fn new(pool: sqlx::PgPool, runtime: tokio::runtime::Handle) -> Self {
            Self { pool, runtime }
        }

        /// Create the outputs table when missing.
        pub async fn migrate(&self) -> Result<(), sqlx::Error> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS crew_outputs (\
                     crew_id TEXT PRIMARY KEY,\
                     output JSONB NOT NULL,\
                     updated_at TIMESTAMPTZ NOT NULL DEFAULT now()\
                 )",
            )
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }

    impl OutputStore for PgStore {
        fn save(&self, crew_id: &str, output: &CrewOutput) {
            let pool = self.pool.clone();
            let crew_id = crew_id.to_string();
            let payload = serde_json::to_value(output).unwrap_or_default();
            self.runtime.spawn(async move {
                let result = sqlx::query(
                    "INSERT INTO crew_outputs (crew_id, output, updated_at)\
                     VALUES ($1, $2, now())\
                     ON CONFLICT (crew_id) DO UPDATE SET output = $2, updated_at = now()",
                )
                .bind(&crew_id)
                .bind(&payload)
                .execute(&pool)
                .await;
                if let Err(e) = result {
                    tracing::error!("failed to save crew output {crew_id}: {e}");
                }
            });
        }

        fn load(&self, crew_id: &str) -> Option<CrewOutput> {
            let pool = self.pool.clone();
            let crew_id = crew_id.to_string();
            let handle = self.runtime.clone();
            // Callable from inside the runtime's worker threads.
            tokio::task::block_in_place(move || {
                handle.block_on(async move {
                    sqlx::query_scalar::<_, serde_json::Value>(
                        "SELECT output FROM crew_outputs WHERE crew_id = $1",
                    )
                    .bind(&crew_id)
                    .fetch_optional(&pool)
                    .await
                    .ok()
                    .flatten()
                })
            })
            .and_then(|value| serde_json::from_value(value).ok())
        }

        fn clear(&self) {
            let pool = self.pool.clone();
            self.runtime.spawn(async move {
                let _ = sqlx::query("TRUNCATE crew_outputs").execute(&pool).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStore::new();
        assert!(store.load("crew-1").is_none());

        let output = CrewOutput::new("result".into(), Vec::new(), Default::default());
        store.save("crew-1", &output);
        assert_eq!(store.load("crew-1").unwrap().raw, "result");

        store.clear();
        assert!(store.load("crew-1").is_none());
    }
}
