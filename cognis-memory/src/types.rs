use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Closed set of memory kinds (spec §3, "Memory").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Episodic,
    Semantic,
    Summary,
    Procedural,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
            MemoryType::Summary => "summary",
            MemoryType::Procedural => "procedural",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A distilled, searchable record associated with `(user_id, app_name)`
/// (spec §3, "Memory"). `embedding`, when present, must be `dim == D` for
/// the process-wide embedding width — callers are expected to enforce this
/// with the `Embedder` they configure, not this type.
#[derive(Debug, Clone)]
pub struct Memory {
    pub id: Uuid,
    pub thread_id: Option<Uuid>,
    pub user_id: String,
    pub app_name: String,
    pub memory_type: MemoryType,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Map<String, Value>,
    pub retention_score: f64,
    pub access_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Memory {
    pub fn new(
        user_id: impl Into<String>,
        app_name: impl Into<String>,
        memory_type: MemoryType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            thread_id: None,
            user_id: user_id.into(),
            app_name: app_name.into(),
            memory_type,
            content: content.into(),
            embedding: None,
            metadata: Map::new(),
            retention_score: 1.0,
            access_count: 0,
            last_accessed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_thread(mut self, thread_id: Uuid) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_retention_score(mut self, score: f64) -> Self {
        self.retention_score = score;
        self
    }
}

/// Closed set of fact kinds (spec §3, "Fact").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    Preference,
    Rule,
    Profile,
}

impl FactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::Preference => "preference",
            FactType::Rule => "rule",
            FactType::Profile => "profile",
        }
    }
}

impl std::fmt::Display for FactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured, uniquely-keyed assertion about a user (spec §3, "Fact").
/// The key tuple `(user_id, app_name, fact_type, key)` is unique; a second
/// write replaces `value`/`embedding` and refreshes timestamps — always an
/// upsert, never a second row. `value` is always a JSON object (spec §9,
/// Design Notes ambiguity: "Fact-value storage").
#[derive(Debug, Clone)]
pub struct Fact {
    pub id: Uuid,
    pub thread_id: Option<Uuid>,
    pub user_id: String,
    pub app_name: String,
    pub fact_type: FactType,
    pub key: String,
    pub value: Value,
    pub embedding: Option<Vec<f32>>,
    pub confidence: f64,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Fact {
    pub fn new(
        user_id: impl Into<String>,
        app_name: impl Into<String>,
        fact_type: FactType,
        key: impl Into<String>,
        value: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            thread_id: None,
            user_id: user_id.into(),
            app_name: app_name.into(),
            fact_type,
            key: key.into(),
            value,
            embedding: None,
            confidence: 1.0,
            valid_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// An expired fact (now > valid_until) is logically absent (spec §3).
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|expiry| now > expiry)
    }

    pub fn with_thread(mut self, thread_id: Uuid) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_valid_until(mut self, valid_until: DateTime<Utc>) -> Self {
        self.valid_until = Some(valid_until);
        self
    }
}

/// Which kind of consolidation pass to run (spec §4.3, "Stages").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FastReplay,
    DeepReflection,
    FullConsolidation,
}

/// Consolidation job lifecycle (spec §3, "Consolidation Job"; spec §9,
/// Design Notes: "the consolidation job's five states ... are persisted").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ConsolidationJob {
    pub id: Uuid,
    pub session_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ConsolidationJob {
    pub fn new(session_id: Uuid, job_type: JobType) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            job_type,
            status: JobStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_expiry() {
        let mut fact = Fact::new("u1", "app", FactType::Preference, "food", Value::from("spicy"));
        assert!(!fact.is_expired(Utc::now()));
        fact.valid_until = Some(Utc::now() - chrono::Duration::days(1));
        assert!(fact.is_expired(Utc::now()));
    }

    #[test]
    fn test_memory_builder() {
        let m = Memory::new("u1", "app", MemoryType::Summary, "hello")
            .with_embedding(vec![0.1, 0.2])
            .with_retention_score(0.5);
        assert_eq!(m.embedding, Some(vec![0.1, 0.2]));
        assert_eq!(m.retention_score, 0.5);
        assert_eq!(m.memory_type.as_str(), "summary");
    }
}
