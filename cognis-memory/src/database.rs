//! Postgres-backed `MemoryRepository`/`JobRepository`. Schema assumed (spec
//! §6): `memories`, `facts`, `consolidation_jobs`, each with the indexes and
//! the `calculate_retention_score` scalar function described in
//! [`crate::retention::SQL_RETENTION_FUNCTION`] — those live in SQL
//! migrations shipped alongside this crate, not in this file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cognis_core::{CognisError, Result};
use pgvector::Vector;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::consolidation::JobRepository;
use crate::repository::{MemoryFilter, MemoryRepository, RetentionDistribution};
use crate::types::{ConsolidationJob, Fact, FactType, JobStatus, JobType, Memory, MemoryType};

pub struct DatabaseMemoryRepository {
    pool: PgPool,
}

impl DatabaseMemoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_db_err(e: sqlx::Error) -> CognisError {
    CognisError::BackendUnavailable(e.to_string())
}

fn memory_type_str(t: MemoryType) -> &'static str {
    t.as_str()
}

fn memory_type_from_str(s: &str) -> MemoryType {
    match s {
        "episodic" => MemoryType::Episodic,
        "semantic" => MemoryType::Semantic,
        "procedural" => MemoryType::Procedural,
        _ => MemoryType::Summary,
    }
}

fn fact_type_from_str(s: &str) -> FactType {
    match s {
        "rule" => FactType::Rule,
        "profile" => FactType::Profile,
        _ => FactType::Preference,
    }
}

fn row_to_memory(row: &PgRow) -> Result<Memory> {
    let memory_type_str: String = row.try_get("memory_type").map_err(map_db_err)?;
    let embedding: Option<Vector> = row.try_get("embedding").map_err(map_db_err)?;
    let metadata_raw: serde_json::Value = row.try_get("metadata").map_err(map_db_err)?;

    Ok(Memory {
        id: row.try_get("id").map_err(map_db_err)?,
        thread_id: row.try_get("thread_id").map_err(map_db_err)?,
        user_id: row.try_get("user_id").map_err(map_db_err)?,
        app_name: row.try_get("app_name").map_err(map_db_err)?,
        memory_type: memory_type_from_str(&memory_type_str),
        content: row.try_get("content").map_err(map_db_err)?,
        embedding: embedding.map(|v| v.to_vec()),
        metadata: match metadata_raw {
            serde_json::Value::Object(m) => m,
            _ => serde_json::Map::new(),
        },
        retention_score: row.try_get("retention_score").map_err(map_db_err)?,
        access_count: row.try_get("access_count").map_err(map_db_err)?,
        last_accessed_at: row.try_get("last_accessed_at").map_err(map_db_err)?,
        created_at: row.try_get("created_at").map_err(map_db_err)?,
    })
}

fn row_to_fact(row: &PgRow) -> Result<Fact> {
    let fact_type_str: String = row.try_get("fact_type").map_err(map_db_err)?;
    let embedding: Option<Vector> = row.try_get("embedding").map_err(map_db_err)?;

    Ok(Fact {
        id: row.try_get("id").map_err(map_db_err)?,
        thread_id: row.try_get("thread_id").map_err(map_db_err)?,
        user_id: row.try_get("user_id").map_err(map_db_err)?,
        app_name: row.try_get("app_name").map_err(map_db_err)?,
        fact_type: fact_type_from_str(&fact_type_str),
        key: row.try_get("key").map_err(map_db_err)?,
        value: row.try_get("value").map_err(map_db_err)?,
        embedding: embedding.map(|v| v.to_vec()),
        confidence: row.try_get("confidence").map_err(map_db_err)?,
        valid_until: row.try_get("valid_until").map_err(map_db_err)?,
        created_at: row.try_get("created_at").map_err(map_db_err)?,
        updated_at: row.try_get("updated_at").map_err(map_db_err)?,
    })
}

fn job_status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

fn job_status_from_str(s: &str) -> JobStatus {
    match s {
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "cancelled" => JobStatus::Cancelled,
        _ => JobStatus::Pending,
    }
}

fn job_type_str(t: JobType) -> &'static str {
    match t {
        JobType::FastReplay => "fast_replay",
        JobType::DeepReflection => "deep_reflection",
        JobType::FullConsolidation => "full_consolidation",
    }
}

fn job_type_from_str(s: &str) -> JobType {
    match s {
        "fast_replay" => JobType::FastReplay,
        "deep_reflection" => JobType::DeepReflection,
        _ => JobType::FullConsolidation,
    }
}

fn row_to_job(row: &PgRow) -> Result<ConsolidationJob> {
    let status_str: String = row.try_get("status").map_err(map_db_err)?;
    let job_type_str: String = row.try_get("job_type").map_err(map_db_err)?;

    Ok(ConsolidationJob {
        id: row.try_get("id").map_err(map_db_err)?,
        session_id: row.try_get("thread_id").map_err(map_db_err)?,
        job_type: job_type_from_str(&job_type_str),
        status: job_status_from_str(&status_str),
        result: row.try_get("result").map_err(map_db_err)?,
        error: row.try_get("error").map_err(map_db_err)?,
        started_at: row.try_get("started_at").map_err(map_db_err)?,
        completed_at: row.try_get("completed_at").map_err(map_db_err)?,
        created_at: row.try_get("created_at").map_err(map_db_err)?,
    })
}

#[async_trait]
impl MemoryRepository for DatabaseMemoryRepository {
    async fn insert_memory(&self, memory: Memory) -> Result<Memory> {
        let embedding = memory.embedding.clone().map(Vector::from);
        let row = sqlx::query(
            "INSERT INTO memories (id, thread_id, user_id, app_name, memory_type, content, embedding, \
                                   metadata, retention_score, access_count, last_accessed_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING id, thread_id, user_id, app_name, memory_type, content, embedding, metadata, \
                       retention_score, access_count, last_accessed_at, created_at",
        )
        .bind(memory.id)
        .bind(memory.thread_id)
        .bind(&memory.user_id)
        .bind(&memory.app_name)
        .bind(memory_type_str(memory.memory_type))
        .bind(&memory.content)
        .bind(embedding)
        .bind(serde_json::Value::Object(memory.metadata.clone()))
        .bind(memory.retention_score)
        .bind(memory.access_count)
        .bind(memory.last_accessed_at)
        .bind(memory.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;

        row_to_memory(&row)
    }

    async fn get_memory(&self, id: Uuid) -> Result<Memory> {
        let row = sqlx::query(
            "SELECT id, thread_id, user_id, app_name, memory_type, content, embedding, metadata, \
                    retention_score, access_count, last_accessed_at, created_at \
             FROM memories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CognisError::NotFound(format!("memory {id}")))?;

        row_to_memory(&row)
    }

    async fn list_memories(&self, filter: MemoryFilter, limit: i64, offset: i64) -> Result<Vec<Memory>> {
        let rows = sqlx::query(
            "SELECT id, thread_id, user_id, app_name, memory_type, content, embedding, metadata, \
                    retention_score, access_count, last_accessed_at, created_at \
             FROM memories \
             WHERE ($1::text IS NULL OR user_id = $1) \
               AND ($2::text IS NULL OR app_name = $2) \
               AND ($3::text IS NULL OR memory_type = $3) \
             ORDER BY retention_score DESC, created_at DESC \
             LIMIT $4 OFFSET $5",
        )
        .bind(&filter.user_id)
        .bind(&filter.app_name)
        .bind(filter.memory_type.map(memory_type_str))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        rows.iter().map(row_to_memory).collect()
    }

    async fn delete_memory(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM memories WHERE id = $1").bind(id).execute(&self.pool).await.map_err(map_db_err)?;
        Ok(())
    }

    async fn upsert_fact(&self, fact: Fact) -> Result<Fact> {
        let embedding = fact.embedding.clone().map(Vector::from);
        let row = sqlx::query(
            "INSERT INTO facts (id, thread_id, user_id, app_name, fact_type, key, value, embedding, \
                                confidence, valid_until, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
             ON CONFLICT (user_id, app_name, fact_type, key) DO UPDATE \
             SET value = EXCLUDED.value, embedding = EXCLUDED.embedding, \
                 confidence = EXCLUDED.confidence, valid_until = EXCLUDED.valid_until, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING id, thread_id, user_id, app_name, fact_type, key, value, embedding, \
                       confidence, valid_until, created_at, updated_at",
        )
        .bind(fact.id)
        .bind(fact.thread_id)
        .bind(&fact.user_id)
        .bind(&fact.app_name)
        .bind(fact.fact_type.as_str())
        .bind(&fact.key)
        .bind(&fact.value)
        .bind(embedding)
        .bind(fact.confidence)
        .bind(fact.valid_until)
        .bind(fact.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;

        row_to_fact(&row)
    }

    async fn get_fact(&self, user_id: &str, app_name: &str, fact_type: FactType, key: &str) -> Result<Option<Fact>> {
        let row = sqlx::query(
            "SELECT id, thread_id, user_id, app_name, fact_type, key, value, embedding, \
                    confidence, valid_until, created_at, updated_at \
             FROM facts \
             WHERE user_id = $1 AND app_name = $2 AND fact_type = $3 AND key = $4 \
               AND (valid_until IS NULL OR valid_until > now())",
        )
        .bind(user_id)
        .bind(app_name)
        .bind(fact_type.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;

        row.as_ref().map(row_to_fact).transpose()
    }

    async fn list_facts(&self, user_id: &str, app_name: &str) -> Result<Vec<Fact>> {
        let rows = sqlx::query(
            "SELECT id, thread_id, user_id, app_name, fact_type, key, value, embedding, \
                    confidence, valid_until, created_at, updated_at \
             FROM facts WHERE user_id = $1 AND app_name = $2 \
               AND (valid_until IS NULL OR valid_until > now())",
        )
        .bind(user_id)
        .bind(app_name)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        rows.iter().map(row_to_fact).collect()
    }

    async fn episodic_slice(
        &self,
        user_id: &str,
        app_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Memory>> {
        let rows = sqlx::query(
            "SELECT id, thread_id, user_id, app_name, memory_type, content, embedding, metadata, \
                    retention_score, access_count, last_accessed_at, created_at \
             FROM memories \
             WHERE user_id = $1 AND app_name = $2 AND created_at >= $3 AND created_at <= $4 \
             ORDER BY created_at DESC LIMIT $5",
        )
        .bind(user_id)
        .bind(app_name)
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        rows.iter().map(row_to_memory).collect()
    }

    async fn record_access(&self, memory_ids: &[Uuid], decay_rate: f64) -> Result<()> {
        if memory_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE memories SET access_count = access_count + 1, last_accessed_at = now(), \
                                 retention_score = calculate_retention_score(access_count + 1, now(), $2) \
             WHERE id = ANY($1)",
        )
        .bind(memory_ids)
        .bind(decay_rate)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn update_all_retention_scores(&self, decay_rate: f64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE memories SET retention_score = calculate_retention_score(access_count, last_accessed_at, $1)",
        )
        .bind(decay_rate)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(result.rows_affected())
    }

    async fn retention_distribution(&self, filter: MemoryFilter) -> Result<RetentionDistribution> {
        let row = sqlx::query(
            "SELECT \
                 COUNT(*) FILTER (WHERE retention_score >= 0.7) AS high, \
                 COUNT(*) FILTER (WHERE retention_score >= 0.3 AND retention_score < 0.7) AS medium, \
                 COUNT(*) FILTER (WHERE retention_score < 0.3) AS low \
             FROM memories \
             WHERE ($1::text IS NULL OR user_id = $1) AND ($2::text IS NULL OR app_name = $2)",
        )
        .bind(&filter.user_id)
        .bind(&filter.app_name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(RetentionDistribution {
            high: row.try_get::<i64, _>("high").map_err(map_db_err)? as u64,
            medium: row.try_get::<i64, _>("medium").map_err(map_db_err)? as u64,
            low: row.try_get::<i64, _>("low").map_err(map_db_err)? as u64,
        })
    }

    async fn delete_low_value(&self, threshold: f64, min_age_days: i64, dry_run: bool) -> Result<u64> {
        if dry_run {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM memories WHERE retention_score < $1 \
                 AND created_at < now() - ($2 || ' days')::interval",
            )
            .bind(threshold)
            .bind(min_age_days.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
            return Ok(count as u64);
        }

        let result = sqlx::query(
            "DELETE FROM memories WHERE retention_score < $1 \
             AND created_at < now() - ($2 || ' days')::interval",
        )
        .bind(threshold)
        .bind(min_age_days.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(result.rows_affected())
    }

    async fn average_retention_score(&self) -> Result<f64> {
        let avg: Option<f64> = sqlx::query_scalar("SELECT AVG(retention_score) FROM memories")
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(avg.unwrap_or(0.0))
    }
}

#[async_trait]
impl JobRepository for DatabaseMemoryRepository {
    async fn insert(&self, job: ConsolidationJob) -> Result<ConsolidationJob> {
        let row = sqlx::query(
            "INSERT INTO consolidation_jobs (id, thread_id, job_type, status, result, error, \
                                             started_at, completed_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id, thread_id, job_type, status, result, error, started_at, completed_at, created_at",
        )
        .bind(job.id)
        .bind(job.session_id)
        .bind(job_type_str(job.job_type))
        .bind(job_status_str(job.status))
        .bind(&job.result)
        .bind(&job.error)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;

        row_to_job(&row)
    }

    async fn update(&self, job: ConsolidationJob) -> Result<ConsolidationJob> {
        let row = sqlx::query(
            "UPDATE consolidation_jobs SET status = $2, result = $3, error = $4, \
                                           started_at = $5, completed_at = $6 \
             WHERE id = $1 \
             RETURNING id, thread_id, job_type, status, result, error, started_at, completed_at, created_at",
        )
        .bind(job.id)
        .bind(job_status_str(job.status))
        .bind(&job.result)
        .bind(&job.error)
        .bind(job.started_at)
        .bind(job.completed_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CognisError::NotFound(format!("job {}", job.id)))?;

        row_to_job(&row)
    }

    async fn get(&self, id: Uuid) -> Result<ConsolidationJob> {
        let row = sqlx::query(
            "SELECT id, thread_id, job_type, status, result, error, started_at, completed_at, created_at \
             FROM consolidation_jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CognisError::NotFound(format!("job {id}")))?;

        row_to_job(&row)
    }
}
