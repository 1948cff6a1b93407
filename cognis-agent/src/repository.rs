use async_trait::async_trait;
use cognis_core::Result;

use crate::tool::ToolMetadata;

/// Typed access to the `tools` table (spec §4.7: "persists tool metadata").
/// `ToolRegistry` writes through to an implementor of this trait on
/// `register_tool` (upsert) and after every `invoke_tool` (fire-and-forget
/// stats update); the in-process callable map never goes through here —
/// only the metadata row does.
#[async_trait]
pub trait ToolRepository: Send + Sync {
    async fn upsert(&self, metadata: &ToolMetadata) -> Result<()>;

    async fn set_active(&self, name: &str, active: bool) -> Result<()>;

    /// Merges a single invocation's elapsed time into the persisted
    /// rolling average and bumps `call_count` by one, in one statement so
    /// concurrent invocations of the same tool don't race each other's
    /// reads (spec §4.7: "rolling average latency").
    async fn record_invocation(&self, name: &str, elapsed_ms: f64) -> Result<()>;

    async fn get(&self, name: &str) -> Result<Option<ToolMetadata>>;

    async fn list(&self) -> Result<Vec<ToolMetadata>>;
}

#[cfg(feature = "postgres")]
mod postgres_impl {
    use super::*;
    use cognis_core::CognisError;
    use serde_json::Value;
    use sqlx::{postgres::PgRow, PgPool, Row};

    pub struct PgToolRepository {
        pool: PgPool,
    }

    impl PgToolRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    fn map_db_err(e: sqlx::Error) -> CognisError {
        CognisError::BackendUnavailable(e.to_string())
    }

    fn row_to_metadata(row: &PgRow) -> Result<ToolMetadata> {
        let permissions_raw: Value = row.try_get("permissions").map_err(map_db_err)?;
        let permissions = match permissions_raw {
            Value::Array(items) => items.into_iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
            _ => Vec::new(),
        };
        Ok(ToolMetadata {
            name: row.try_get("name").map_err(map_db_err)?,
            display_name: row.try_get("display_name").map_err(map_db_err)?,
            description: row.try_get("description").map_err(map_db_err)?,
            parameters_schema: row.try_get("parameters_schema").map_err(map_db_err)?,
            permissions,
            active: row.try_get("active").map_err(map_db_err)?,
            call_count: {
                let n: i64 = row.try_get("call_count").map_err(map_db_err)?;
                n as u64
            },
            average_latency_ms: row.try_get("average_latency_ms").map_err(map_db_err)?,
        })
    }

    #[async_trait]
    impl ToolRepository for PgToolRepository {
        async fn upsert(&self, metadata: &ToolMetadata) -> Result<()> {
            let permissions = Value::Array(metadata.permissions.iter().cloned().map(Value::String).collect());
            sqlx::query(
                "INSERT INTO tools (name, display_name, description, parameters_schema, permissions, active, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, now()) \
                 ON CONFLICT (name) DO UPDATE SET \
                    display_name = EXCLUDED.display_name, \
                    description = EXCLUDED.description, \
                    parameters_schema = EXCLUDED.parameters_schema, \
                    permissions = EXCLUDED.permissions, \
                    active = EXCLUDED.active, \
                    updated_at = now()",
            )
            .bind(&metadata.name)
            .bind(&metadata.display_name)
            .bind(&metadata.description)
            .bind(&metadata.parameters_schema)
            .bind(permissions)
            .bind(metadata.active)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(())
        }

        async fn set_active(&self, name: &str, active: bool) -> Result<()> {
            sqlx::query("UPDATE tools SET active = $2, updated_at = now() WHERE name = $1")
                .bind(name)
                .bind(active)
                .execute(&self.pool)
                .await
                .map_err(map_db_err)?;
            Ok(())
        }

        async fn record_invocation(&self, name: &str, elapsed_ms: f64) -> Result<()> {
            sqlx::query(
                "UPDATE tools SET \
                    average_latency_ms = (average_latency_ms * call_count + $2) / (call_count + 1), \
                    call_count = call_count + 1, \
                    updated_at = now() \
                 WHERE name = $1",
            )
            .bind(name)
            .bind(elapsed_ms)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(())
        }

        async fn get(&self, name: &str) -> Result<Option<ToolMetadata>> {
            let row = sqlx::query("SELECT * FROM tools WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?;
            row.as_ref().map(row_to_metadata).transpose()
        }

        async fn list(&self) -> Result<Vec<ToolMetadata>> {
            let rows = sqlx::query("SELECT * FROM tools ORDER BY name").fetch_all(&self.pool).await.map_err(map_db_err)?;
            rows.iter().map(row_to_metadata).collect()
        }
    }
}

#[cfg(feature = "postgres")]
pub use postgres_impl::PgToolRepository;
