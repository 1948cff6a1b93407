use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cognis_core::Result;
use uuid::Uuid;

use crate::types::{Fact, FactType, Memory, MemoryType};

/// Filters shared by `list` and the retention distribution query.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub user_id: Option<String>,
    pub app_name: Option<String>,
    pub memory_type: Option<MemoryType>,
}

/// Typed access to the `memories` and `facts` tables (spec §6). Kept
/// narrow and parameterized, the way `cognis-session`'s `SessionService`
/// exposes a handful of statements rather than a generic query builder.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    async fn insert_memory(&self, memory: Memory) -> Result<Memory>;

    async fn get_memory(&self, id: Uuid) -> Result<Memory>;

    /// `list_memories` with pagination (supplemented from
    /// `hippocampus/memory_service.py::list_memories` — see SPEC_FULL.md §3).
    async fn list_memories(&self, filter: MemoryFilter, limit: i64, offset: i64) -> Result<Vec<Memory>>;

    async fn delete_memory(&self, id: Uuid) -> Result<()>;

    /// Upserts a fact keyed on `(user_id, app_name, fact_type, key)`: a
    /// second write replaces `value`/`embedding`/`confidence` and refreshes
    /// `updated_at`, leaving exactly one row (spec §3, "Fact").
    async fn upsert_fact(&self, fact: Fact) -> Result<Fact>;

    async fn get_fact(&self, user_id: &str, app_name: &str, fact_type: FactType, key: &str) -> Result<Option<Fact>>;

    async fn list_facts(&self, user_id: &str, app_name: &str) -> Result<Vec<Fact>>;

    /// Episodic time-slice retrieval (supplemented from
    /// `retention_manager.py::get_episodic_memories_by_time_slice`).
    async fn episodic_slice(
        &self,
        user_id: &str,
        app_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Memory>>;

    /// Bumps `access_count`, stamps `last_accessed_at=now`, and recomputes
    /// `retention_score` for every id in one statement (spec §4.4,
    /// "record_access").
    async fn record_access(&self, memory_ids: &[Uuid], decay_rate: f64) -> Result<()>;

    /// Bulk-recomputes `retention_score` for every memory row; returns the
    /// number of rows touched (spec §4.4, "update_all_retention_scores").
    async fn update_all_retention_scores(&self, decay_rate: f64) -> Result<u64>;

    /// Counts in the three retention buckets (spec §4.4,
    /// "get_retention_distribution").
    async fn retention_distribution(&self, filter: MemoryFilter) -> Result<RetentionDistribution>;

    /// Deletes (or, if `dry_run`, just counts) rows with
    /// `retention_score < threshold AND created_at < now - min_age_days`
    /// (spec §4.4, "cleanup_low_value_memories").
    async fn delete_low_value(&self, threshold: f64, min_age_days: i64, dry_run: bool) -> Result<u64>;

    /// Average `retention_score` across all memory rows, used to report
    /// `cleanup_low_value_memories`'s post-cleanup statistics.
    async fn average_retention_score(&self) -> Result<f64>;
}

/// Bucketed counts by retention score: high >= 0.7, medium in [0.3, 0.7),
/// low < 0.3 (spec §4.4).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionDistribution {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl RetentionDistribution {
    pub fn total(&self) -> u64 {
        self.high + self.medium + self.low
    }
}
