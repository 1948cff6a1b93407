use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cognis_core::Result;
use tracing::{error, info};
use uuid::Uuid;

use crate::repository::{MemoryFilter, MemoryRepository, RetentionDistribution};

/// High bucket lower bound (spec §4.4).
pub const HIGH_THRESHOLD: f64 = 0.7;
/// Medium bucket lower bound (spec §4.4).
pub const MEDIUM_THRESHOLD: f64 = 0.3;

/// The in-process implementation of the decaying retention score (spec
/// §4.4): `score = (1 - exp(-λ·access_count)) · exp(-λ·age_days)`.
///
/// A SQL scalar function computing the identical formula is embedded as
/// [`SQL_RETENTION_FUNCTION`] and installed by the migration as
/// `calculate_retention_score`; both forms must agree to within
/// floating-point precision (spec §9, Design Notes ambiguity flag; spec
/// §8, "retention_score returned by the SQL function matches the
/// in-process implementation to 1e-9").
pub fn score(access_count: i64, last_accessed_at: Option<DateTime<Utc>>, decay_rate: f64, now: DateTime<Utc>) -> f64 {
    let age_days = match last_accessed_at {
        Some(ts) => (now - ts).num_milliseconds() as f64 / 86_400_000.0,
        None => 0.0,
    };
    let age_days = age_days.max(0.0);
    (1.0 - (-decay_rate * access_count as f64).exp()) * (-decay_rate * age_days).exp()
}

/// SQL source for the `calculate_retention_score` scalar function (spec
/// §6, "SQL-callable search functions"). Shipped as a string constant so
/// the migration and [`score`] are reviewed side by side instead of
/// drifting apart silently.
pub const SQL_RETENTION_FUNCTION: &str = r#"
CREATE OR REPLACE FUNCTION calculate_retention_score(
    access_count BIGINT,
    last_accessed_at TIMESTAMPTZ,
    decay_rate DOUBLE PRECISION
) RETURNS DOUBLE PRECISION AS $$
DECLARE
    age_days DOUBLE PRECISION;
BEGIN
    IF last_accessed_at IS NULL THEN
        age_days := 0;
    ELSE
        age_days := GREATEST(0, EXTRACT(EPOCH FROM (NOW() - last_accessed_at)) / 86400.0);
    END IF;
    RETURN (1 - EXP(-decay_rate * access_count)) * EXP(-decay_rate * age_days);
END;
$$ LANGUAGE plpgsql IMMUTABLE;
"#;

/// Statistics returned by `cleanup_low_value_memories` (spec §4.4).
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupStats {
    pub distribution: RetentionDistribution,
    pub deleted_count: u64,
    pub average_retention_score: f64,
}

/// Implements the forgetting curve: scores, decays, and prunes stored
/// memories (spec §4.4). Holds only a decay rate and the thresholds used
/// by `cleanup_low_value_memories`'s defaults — the repository does the
/// actual storage work so this type stays backend-agnostic.
pub struct RetentionManager<R: MemoryRepository> {
    repo: Arc<R>,
    decay_rate: f64,
    default_threshold: f64,
    default_min_age_days: i64,
}

impl<R: MemoryRepository> RetentionManager<R> {
    pub fn new(repo: Arc<R>, decay_rate: f64) -> Self {
        Self { repo, decay_rate, default_threshold: 0.1, default_min_age_days: 7 }
    }

    pub fn with_defaults(mut self, threshold: f64, min_age_days: i64) -> Self {
        self.default_threshold = threshold;
        self.default_min_age_days = min_age_days;
        self
    }

    pub async fn record_access(&self, memory_ids: &[Uuid]) -> Result<()> {
        if memory_ids.is_empty() {
            return Ok(());
        }
        self.repo.record_access(memory_ids, self.decay_rate).await
    }

    pub async fn update_all_retention_scores(&self) -> Result<u64> {
        self.repo.update_all_retention_scores(self.decay_rate).await
    }

    pub async fn get_retention_distribution(&self, filter: MemoryFilter) -> Result<RetentionDistribution> {
        self.repo.retention_distribution(filter).await
    }

    /// First refreshes every score, then deletes rows below `threshold`
    /// older than `min_age_days` — unless `dry_run`, in which case nothing
    /// is deleted and the count alone is reported (spec §4.4; spec §8:
    /// "`cleanup_low_value_memories(dry_run=true)` never changes row
    /// count; `dry_run=false` with identical inputs deletes exactly the
    /// rows enumerated in the dry-run count").
    pub async fn cleanup_low_value_memories(
        &self,
        threshold: Option<f64>,
        min_age_days: Option<i64>,
        dry_run: bool,
    ) -> Result<CleanupStats> {
        let threshold = threshold.unwrap_or(self.default_threshold);
        let min_age_days = min_age_days.unwrap_or(self.default_min_age_days);

        self.update_all_retention_scores().await?;

        let deleted_count = self.repo.delete_low_value(threshold, min_age_days, dry_run).await?;
        let distribution = self.repo.retention_distribution(MemoryFilter::default()).await?;
        let average_retention_score = self.repo.average_retention_score().await?;

        Ok(CleanupStats { distribution, deleted_count, average_retention_score })
    }

    pub async fn episodic_slice(
        &self,
        user_id: &str,
        app_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<crate::types::Memory>> {
        self.repo.episodic_slice(user_id, app_name, start, end, limit).await
    }

    /// Background loop running `cleanup_low_value_memories` at `interval`;
    /// exceptions are logged but never terminate the loop (spec §4.4,
    /// "Scheduling"). Runs until cancelled via the returned handle's
    /// `abort`, matching the way `tokio::spawn` is used elsewhere in this
    /// workspace for long-lived background tasks.
    pub fn spawn_cleanup_loop(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()>
    where
        R: 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.cleanup_low_value_memories(None, None, false).await {
                    Ok(stats) => info!(
                        deleted = stats.deleted_count,
                        remaining = stats.distribution.total(),
                        "retention cleanup completed"
                    ),
                    Err(err) => error!(error = %err, "retention cleanup failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_zero_access_is_zero() {
        let now = Utc::now();
        assert_eq!(score(0, None, 0.1, now), 0.0);
    }

    #[test]
    fn test_score_increases_with_access_count() {
        let now = Utc::now();
        let low = score(1, Some(now), 0.1, now);
        let high = score(10, Some(now), 0.1, now);
        assert!(high > low);
    }

    #[test]
    fn test_score_decays_with_age() {
        let now = Utc::now();
        let fresh = score(5, Some(now), 0.1, now);
        let stale = score(5, Some(now - chrono::Duration::days(30)), 0.1, now);
        assert!(fresh > stale);
    }

    #[test]
    fn test_score_bounded_zero_to_one() {
        let now = Utc::now();
        for access in [0, 1, 5, 100] {
            let s = score(access, Some(now), 0.1, now);
            assert!((0.0..=1.0).contains(&s), "score {s} out of bounds for access_count {access}");
        }
    }

    #[test]
    fn test_score_no_last_access_treats_age_as_zero() {
        let now = Utc::now();
        assert_eq!(score(3, None, 0.1, now), score(3, Some(now), 0.1, now));
    }
}
