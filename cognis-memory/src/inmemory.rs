use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use cognis_core::{CognisError, Result};
use uuid::Uuid;

use crate::consolidation::JobRepository;
use crate::repository::{MemoryFilter, MemoryRepository, RetentionDistribution};
use crate::retention::{score, HIGH_THRESHOLD, MEDIUM_THRESHOLD};
use crate::types::{ConsolidationJob, Fact, FactType, Memory};

/// Reference `MemoryRepository`/`JobRepository` for tests and local
/// development, the same role `InMemorySessionService` plays for
/// `cognis-session`.
#[derive(Default)]
pub struct InMemoryMemoryRepository {
    memories: RwLock<HashMap<Uuid, Memory>>,
    facts: RwLock<HashMap<(String, String, &'static str, String), Fact>>,
    jobs: RwLock<HashMap<Uuid, ConsolidationJob>>,
}

impl InMemoryMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn fact_type_tag(fact_type: FactType) -> &'static str {
        fact_type.as_str()
    }
}

#[async_trait]
impl MemoryRepository for InMemoryMemoryRepository {
    async fn insert_memory(&self, memory: Memory) -> Result<Memory> {
        self.memories.write().unwrap().insert(memory.id, memory.clone());
        Ok(memory)
    }

    async fn get_memory(&self, id: Uuid) -> Result<Memory> {
        self.memories
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| CognisError::NotFound(format!("memory {id}")))
    }

    async fn list_memories(&self, filter: MemoryFilter, limit: i64, offset: i64) -> Result<Vec<Memory>> {
        let memories = self.memories.read().unwrap();
        let mut matched: Vec<Memory> = memories
            .values()
            .filter(|m| filter.user_id.as_deref().is_none_or(|u| u == m.user_id))
            .filter(|m| filter.app_name.as_deref().is_none_or(|a| a == m.app_name))
            .filter(|m| filter.memory_type.is_none_or(|t| t == m.memory_type))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.retention_score
                .partial_cmp(&a.retention_score)
                .unwrap()
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        let start = offset.max(0) as usize;
        let end = (start + limit.max(0) as usize).min(matched.len());
        Ok(if start >= matched.len() { Vec::new() } else { matched[start..end].to_vec() })
    }

    async fn delete_memory(&self, id: Uuid) -> Result<()> {
        self.memories.write().unwrap().remove(&id);
        Ok(())
    }

    async fn upsert_fact(&self, mut fact: Fact) -> Result<Fact> {
        let key = (fact.user_id.clone(), fact.app_name.clone(), Self::fact_type_tag(fact.fact_type), fact.key.clone());
        let mut facts = self.facts.write().unwrap();
        if let Some(existing) = facts.get(&key) {
            fact.id = existing.id;
            fact.created_at = existing.created_at;
        }
        fact.updated_at = Utc::now();
        facts.insert(key, fact.clone());
        Ok(fact)
    }

    async fn get_fact(&self, user_id: &str, app_name: &str, fact_type: FactType, key: &str) -> Result<Option<Fact>> {
        let tag = Self::fact_type_tag(fact_type);
        let facts = self.facts.read().unwrap();
        let fact = facts.get(&(user_id.to_string(), app_name.to_string(), tag, key.to_string())).cloned();
        Ok(fact.filter(|f| !f.is_expired(Utc::now())))
    }

    async fn list_facts(&self, user_id: &str, app_name: &str) -> Result<Vec<Fact>> {
        let now = Utc::now();
        Ok(self
            .facts
            .read()
            .unwrap()
            .values()
            .filter(|f| f.user_id == user_id && f.app_name == app_name && !f.is_expired(now))
            .cloned()
            .collect())
    }

    async fn episodic_slice(
        &self,
        user_id: &str,
        app_name: &str,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Memory>> {
        let memories = self.memories.read().unwrap();
        let mut matched: Vec<Memory> = memories
            .values()
            .filter(|m| m.user_id == user_id && m.app_name == app_name)
            .filter(|m| m.created_at >= start && m.created_at <= end)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(limit.max(0) as usize);
        Ok(matched)
    }

    async fn record_access(&self, memory_ids: &[Uuid], decay_rate: f64) -> Result<()> {
        let now = Utc::now();
        let mut memories = self.memories.write().unwrap();
        for id in memory_ids {
            if let Some(m) = memories.get_mut(id) {
                m.access_count += 1;
                m.last_accessed_at = Some(now);
                m.retention_score = score(m.access_count, m.last_accessed_at, decay_rate, now);
            }
        }
        Ok(())
    }

    async fn update_all_retention_scores(&self, decay_rate: f64) -> Result<u64> {
        let now = Utc::now();
        let mut memories = self.memories.write().unwrap();
        for m in memories.values_mut() {
            m.retention_score = score(m.access_count, m.last_accessed_at, decay_rate, now);
        }
        Ok(memories.len() as u64)
    }

    async fn retention_distribution(&self, filter: MemoryFilter) -> Result<RetentionDistribution> {
        let memories = self.memories.read().unwrap();
        let mut dist = RetentionDistribution::default();
        for m in memories
            .values()
            .filter(|m| filter.user_id.as_deref().is_none_or(|u| u == m.user_id))
            .filter(|m| filter.app_name.as_deref().is_none_or(|a| a == m.app_name))
        {
            if m.retention_score >= HIGH_THRESHOLD {
                dist.high += 1;
            } else if m.retention_score >= MEDIUM_THRESHOLD {
                dist.medium += 1;
            } else {
                dist.low += 1;
            }
        }
        Ok(dist)
    }

    async fn delete_low_value(&self, threshold: f64, min_age_days: i64, dry_run: bool) -> Result<u64> {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::days(min_age_days);
        let mut memories = self.memories.write().unwrap();
        let stale: Vec<Uuid> = memories
            .values()
            .filter(|m| m.retention_score < threshold && m.created_at < cutoff)
            .map(|m| m.id)
            .collect();
        if !dry_run {
            for id in &stale {
                memories.remove(id);
            }
        }
        Ok(stale.len() as u64)
    }

    async fn average_retention_score(&self) -> Result<f64> {
        let memories = self.memories.read().unwrap();
        if memories.is_empty() {
            return Ok(0.0);
        }
        Ok(memories.values().map(|m| m.retention_score).sum::<f64>() / memories.len() as f64)
    }
}

#[async_trait]
impl JobRepository for InMemoryMemoryRepository {
    async fn insert(&self, job: ConsolidationJob) -> Result<ConsolidationJob> {
        self.jobs.write().unwrap().insert(job.id, job.clone());
        Ok(job)
    }

    async fn update(&self, job: ConsolidationJob) -> Result<ConsolidationJob> {
        self.jobs.write().unwrap().insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<ConsolidationJob> {
        self.jobs.read().unwrap().get(&id).cloned().ok_or_else(|| CognisError::NotFound(format!("job {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryType;

    #[tokio::test]
    async fn test_insert_and_get_memory() {
        let repo = InMemoryMemoryRepository::new();
        let memory = Memory::new("u1", "app", MemoryType::Summary, "hello");
        let id = memory.id;
        repo.insert_memory(memory).await.unwrap();
        let fetched = repo.get_memory(id).await.unwrap();
        assert_eq!(fetched.content, "hello");
    }

    #[tokio::test]
    async fn test_upsert_fact_replaces_value_single_row() {
        let repo = InMemoryMemoryRepository::new();
        let fact = Fact::new("u1", "app", FactType::Preference, "food", serde_json::json!("spicy"));
        repo.upsert_fact(fact).await.unwrap();

        let updated = Fact::new("u1", "app", FactType::Preference, "food", serde_json::json!("sweet"));
        repo.upsert_fact(updated).await.unwrap();

        let facts = repo.list_facts("u1", "app").await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value, serde_json::json!("sweet"));
    }

    #[tokio::test]
    async fn test_dry_run_cleanup_never_deletes() {
        let repo = InMemoryMemoryRepository::new();
        let mut memory = Memory::new("u1", "app", MemoryType::Episodic, "stale");
        memory.retention_score = 0.01;
        memory.created_at = Utc::now() - chrono::Duration::days(30);
        repo.insert_memory(memory).await.unwrap();

        let dry_count = repo.delete_low_value(0.1, 7, true).await.unwrap();
        assert_eq!(dry_count, 1);
        assert_eq!(repo.memories.read().unwrap().len(), 1);

        let real_count = repo.delete_low_value(0.1, 7, false).await.unwrap();
        assert_eq!(real_count, 1);
        assert!(repo.memories.read().unwrap().is_empty());
    }
}
