use async_trait::async_trait;
use cognis_core::Result;

use crate::types::HybridSearchResult;

/// L0 coarse recall over the `hybrid_search` SQL function: `combined_score =
/// 0.7*semantic_score + 0.3*keyword_score` (spec §4.5, "Coarse recall
/// (L0)"). A single call, ranked in the database, so it can lean on the
/// HNSW/GIN indexes instead of round-tripping candidate sets.
#[async_trait]
pub trait HybridSearch: Send + Sync {
    async fn search(
        &self,
        user_id: &str,
        app_name: &str,
        query_text: &str,
        query_embedding: &[f32],
        limit: i64,
    ) -> Result<Vec<HybridSearchResult>>;
}

#[cfg(feature = "postgres")]
mod postgres_impl {
    use super::*;
    use cognis_core::CognisError;
    use pgvector::Vector;
    use sqlx::{PgPool, Row};

    /// Drives the `hybrid_search` Postgres function (spec §6,
    /// "SQL-callable search functions"). For scopes expected to be
    /// high-selectivity the caller should widen `ef_search` on the
    /// connection first (spec §4.5) — this type issues the recall query
    /// only, leaving session-level tuning to the caller since it shares a
    /// pooled connection it does not own exclusively.
    pub struct PgHybridSearch {
        pool: PgPool,
    }

    impl PgHybridSearch {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        /// Sets `hnsw.ef_search` for the current session (spec §4.5:
        /// "the session first sets the vector index's ef_search ... and
        /// enables iterative_scan=relaxed_order"). Callers invoke this
        /// immediately before `search` when the scope filter is expected to
        /// eliminate most of the table.
        pub async fn tune_for_high_selectivity(&self, ef_search: u32) -> Result<()> {
            sqlx::query(&format!("SET hnsw.ef_search = {ef_search}"))
                .execute(&self.pool)
                .await
                .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
            sqlx::query("SET hnsw.iterative_scan = relaxed_order")
                .execute(&self.pool)
                .await
                .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
            Ok(())
        }
    }

    #[async_trait]
    impl HybridSearch for PgHybridSearch {
        async fn search(
            &self,
            user_id: &str,
            app_name: &str,
            query_text: &str,
            query_embedding: &[f32],
            limit: i64,
        ) -> Result<Vec<HybridSearchResult>> {
            let embedding = Vector::from(query_embedding.to_vec());
            let rows = sqlx::query(
                "SELECT id, content, semantic_score, keyword_score, combined_score, metadata \
                 FROM hybrid_search($1, $2, $3, $4, $5)",
            )
            .bind(user_id)
            .bind(app_name)
            .bind(query_text)
            .bind(embedding)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;

            rows.into_iter()
                .map(|row| {
                    let metadata_raw: serde_json::Value =
                        row.try_get("metadata").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
                    Ok(HybridSearchResult {
                        id: row.try_get("id").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
                        content: row.try_get("content").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
                        semantic_score: row
                            .try_get("semantic_score")
                            .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
                        keyword_score: row
                            .try_get("keyword_score")
                            .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
                        combined_score: row
                            .try_get("combined_score")
                            .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
                        metadata: match metadata_raw {
                            serde_json::Value::Object(m) => m,
                            _ => serde_json::Map::new(),
                        },
                    })
                })
                .collect()
        }
    }
}

#[cfg(feature = "postgres")]
pub use postgres_impl::PgHybridSearch;

/// Recomputes `combined_score` from its two components. Kept alongside the
/// trait so the weighting stays pinned in Rust even though the SQL function
/// computes the same blend server-side (spec §4.5, "Coarse recall (L0)").
pub fn combined_score(semantic_score: f64, keyword_score: f64) -> f64 {
    0.7 * semantic_score + 0.3 * keyword_score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_score_weighting() {
        assert!((combined_score(1.0, 0.0) - 0.7).abs() < 1e-9);
        assert!((combined_score(0.0, 1.0) - 0.3).abs() < 1e-9);
        assert!((combined_score(1.0, 1.0) - 1.0).abs() < 1e-9);
    }
}
