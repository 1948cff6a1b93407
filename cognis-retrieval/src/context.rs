use std::sync::Arc;

use cognis_core::{Author, Result};
use cognis_memory::{Memory, MemoryRepository, RetentionManager};
use cognis_session::Event;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::hybrid::HybridSearch;

/// Which section of the prompt a [`ContextItem`] belongs to, and in turn
/// which fixed heading it renders under (spec §4.6, "Output formatting").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextItemType {
    System,
    Fact,
    Memory,
    History,
}

#[derive(Debug, Clone)]
pub struct ContextItem {
    pub item_type: ContextItemType,
    pub content: String,
    pub relevance_score: f64,
    pub token_estimate: usize,
    pub metadata: Map<String, Value>,
}

impl ContextItem {
    fn new(item_type: ContextItemType, content: String, relevance_score: f64) -> Self {
        let token_estimate = estimate_tokens(&content);
        Self { item_type, content, relevance_score, token_estimate, metadata: Map::new() }
    }

    fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// An assembled prompt context: the chosen items in section order, the
/// total estimated token count, and how much of `max_tokens` was used
/// (spec §4.6).
#[derive(Debug, Clone)]
pub struct ContextWindow {
    pub items: Vec<ContextItem>,
    pub total_tokens: usize,
    pub budget_used: f64,
}

impl ContextWindow {
    /// Renders the window into the fixed section layout: `system` content
    /// first with no heading, then `## 用户偏好` (facts), `## 相关记忆`
    /// (memories), `## 对话历史` (history) — sections present only if they
    /// have items, separated by blank lines (spec §4.6, "Output formatting";
    /// ported verbatim from `context_assembler.py::format_context`).
    pub fn format(&self) -> String {
        let mut system = Vec::new();
        let mut facts = Vec::new();
        let mut memories = Vec::new();
        let mut history = Vec::new();

        for item in &self.items {
            match item.item_type {
                ContextItemType::System => system.push(item.content.as_str()),
                ContextItemType::Fact => facts.push(item.content.as_str()),
                ContextItemType::Memory => memories.push(item.content.as_str()),
                ContextItemType::History => history.push(item.content.as_str()),
            }
        }

        let mut parts: Vec<String> = Vec::new();
        if !system.is_empty() {
            parts.push(system.join("\n"));
        }
        if !facts.is_empty() {
            let mut section = vec!["## 用户偏好".to_string()];
            section.extend(facts.iter().map(|s| s.to_string()));
            parts.push(section.join("\n"));
        }
        if !memories.is_empty() {
            let mut section = vec!["## 相关记忆".to_string()];
            section.extend(memories.iter().map(|s| s.to_string()));
            parts.push(section.join("\n"));
        }
        if !history.is_empty() {
            let mut section = vec!["## 对话历史".to_string()];
            section.extend(history.iter().map(|s| s.to_string()));
            parts.push(section.join("\n"));
        }

        parts.join("\n\n")
    }
}

/// Estimates token count as `⌈len(text)/4⌉ + 1` (spec §4.6, "Estimate
/// tokens").
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4) + 1
}

/// Per-section candidate counts before budget truncation (spec §4.6,
/// "Retrieve up to a per-section candidate count").
const MEMORY_CANDIDATES: i64 = 10;
const HISTORY_CANDIDATES: usize = 30;
const FACT_CANDIDATES: usize = 10;

/// Assembles a bounded prompt context out of the system prompt, retrieved
/// memories, recent history, and facts, apportioning `max_tokens` by ratio
/// across the four sections (spec §4.6). Accepts already-fetched recent
/// events rather than querying session storage itself, the same
/// storage-agnostic shape [`cognis_memory::ConsolidationWorker::consolidate`]
/// uses.
pub struct ContextAssembler<M: MemoryRepository, H: HybridSearch> {
    memory_repo: Arc<M>,
    hybrid_search: Arc<H>,
    retention: Option<Arc<RetentionManager<M>>>,
    max_tokens: usize,
    system_ratio: f64,
    facts_ratio: f64,
    memories_ratio: f64,
    history_ratio: f64,
}

impl<M: MemoryRepository + 'static, H: HybridSearch> ContextAssembler<M, H> {
    pub fn new(memory_repo: Arc<M>, hybrid_search: Arc<H>) -> Self {
        Self {
            memory_repo,
            hybrid_search,
            retention: None,
            max_tokens: 8000,
            system_ratio: 0.1,
            facts_ratio: 0.2,
            memories_ratio: 0.3,
            history_ratio: 0.4,
        }
    }

    /// Wires in a [`RetentionManager`] so retrieved memories trigger
    /// `record_access` (spec §4.5: "Accessing a returned memory triggers
    /// `record_access` via batch so retention scores reflect genuine use").
    pub fn with_retention(mut self, retention: Arc<RetentionManager<M>>) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn with_budget(mut self, max_tokens: usize, system: f64, facts: f64, memories: f64, history: f64) -> Self {
        self.max_tokens = max_tokens;
        self.system_ratio = system;
        self.facts_ratio = facts;
        self.memories_ratio = memories;
        self.history_ratio = history;
        self
    }

    pub async fn assemble(
        &self,
        user_id: &str,
        app_name: &str,
        query_text: &str,
        query_embedding: &[f32],
        system_prompt: Option<&str>,
        recent_events: &[Event],
    ) -> Result<ContextWindow> {
        let mut items = Vec::new();
        let mut total_tokens = 0usize;

        if let Some(prompt) = system_prompt {
            let system_budget = (self.max_tokens as f64 * self.system_ratio) as usize;
            let item = ContextItem::new(ContextItemType::System, prompt.to_string(), 1.0);
            if item.token_estimate <= system_budget {
                total_tokens += item.token_estimate;
                items.push(item);
            }
        }

        let memory_budget = (self.max_tokens as f64 * self.memories_ratio) as usize;
        let (memory_items, accessed_ids) =
            self.retrieve_memories(user_id, app_name, query_text, query_embedding, memory_budget).await?;
        for item in memory_items {
            if total_tokens + item.token_estimate > self.max_tokens {
                break;
            }
            total_tokens += item.token_estimate;
            items.push(item);
        }
        if let Some(retention) = &self.retention {
            retention.record_access(&accessed_ids).await?;
        }

        let history_budget = (self.max_tokens as f64 * self.history_ratio) as usize;
        for item in retrieve_history(recent_events, history_budget) {
            if total_tokens + item.token_estimate > self.max_tokens {
                break;
            }
            total_tokens += item.token_estimate;
            items.push(item);
        }

        let fact_budget = (self.max_tokens as f64 * self.facts_ratio) as usize;
        let fact_items = self.retrieve_facts(user_id, app_name, fact_budget).await?;
        for item in fact_items {
            if total_tokens + item.token_estimate > self.max_tokens {
                break;
            }
            total_tokens += item.token_estimate;
            items.push(item);
        }

        let budget_used = total_tokens as f64 / self.max_tokens as f64;
        Ok(ContextWindow { items, total_tokens, budget_used })
    }

    /// Ranks by `combined_score * retention_score`, mirroring the original's
    /// `ORDER BY similarity * retention_score DESC` (spec §4.6, supplemented
    /// from `context_assembler.py::_retrieve_memories`).
    async fn retrieve_memories(
        &self,
        user_id: &str,
        app_name: &str,
        query_text: &str,
        query_embedding: &[f32],
        budget: usize,
    ) -> Result<(Vec<ContextItem>, Vec<Uuid>)> {
        let candidates =
            self.hybrid_search.search(user_id, app_name, query_text, query_embedding, MEMORY_CANDIDATES).await?;

        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let retention_score = self.memory_repo.get_memory(candidate.id).await.map(|m: Memory| m.retention_score).unwrap_or(1.0);
            let relevance = candidate.combined_score * retention_score;
            scored.push((candidate, relevance));
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut items = Vec::new();
        let mut ids = Vec::new();
        let mut tokens_used = 0usize;
        for (candidate, relevance) in scored {
            let mut metadata = candidate.metadata.clone();
            metadata.insert("memory_id".to_string(), Value::from(candidate.id.to_string()));
            let item = ContextItem::new(ContextItemType::Memory, candidate.content, relevance).with_metadata(metadata);
            if tokens_used + item.token_estimate > budget {
                break;
            }
            tokens_used += item.token_estimate;
            ids.push(candidate.id);
            items.push(item);
        }
        Ok((items, ids))
    }

    async fn retrieve_facts(&self, user_id: &str, app_name: &str, budget: usize) -> Result<Vec<ContextItem>> {
        let mut facts = self.memory_repo.list_facts(user_id, app_name).await?;
        facts.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        facts.truncate(FACT_CANDIDATES);

        let mut items = Vec::new();
        let mut tokens_used = 0usize;
        for fact in facts {
            let content = format!("[{}] {}: {}", fact.fact_type, fact.key, fact.value);
            let mut metadata = Map::new();
            metadata.insert("fact_id".to_string(), Value::from(fact.id.to_string()));
            let item = ContextItem::new(ContextItemType::Fact, content, fact.confidence).with_metadata(metadata);
            if tokens_used + item.token_estimate > budget {
                break;
            }
            tokens_used += item.token_estimate;
            items.push(item);
        }
        Ok(items)
    }
}

/// `recent_events` is expected in chronological (ascending sequence_num)
/// order already; the most recent [`HISTORY_CANDIDATES`] are kept, oldest
/// first, mirroring the original's DESC-then-reversed retrieval (spec
/// §4.6).
fn retrieve_history(recent_events: &[Event], budget: usize) -> Vec<ContextItem> {
    let start = recent_events.len().saturating_sub(HISTORY_CANDIDATES);
    let window = &recent_events[start..];

    let mut items = Vec::new();
    let mut tokens_used = 0usize;
    for event in window {
        let text = match &event.content {
            Value::Object(map) => map.get("text").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| event.content.to_string()),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let formatted = format!("[{}]: {}", author_label(event.author), text);
        let item = ContextItem::new(ContextItemType::History, formatted, 1.0);
        if tokens_used + item.token_estimate > budget {
            break;
        }
        tokens_used += item.token_estimate;
        items.push(item);
    }
    items
}

fn author_label(author: Author) -> &'static str {
    author.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_matches_formula() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abcd"), 2);
        assert_eq!(estimate_tokens("abcde"), 3);
    }

    #[test]
    fn test_format_omits_empty_sections() {
        let window = ContextWindow {
            items: vec![ContextItem::new(ContextItemType::System, "be helpful".to_string(), 1.0)],
            total_tokens: 3,
            budget_used: 0.01,
        };
        assert_eq!(window.format(), "be helpful");
    }

    #[test]
    fn test_format_renders_fixed_headers_in_order() {
        let window = ContextWindow {
            items: vec![
                ContextItem::new(ContextItemType::System, "sys".to_string(), 1.0),
                ContextItem::new(ContextItemType::Fact, "likes spicy food".to_string(), 1.0),
                ContextItem::new(ContextItemType::Memory, "discussed trip".to_string(), 1.0),
                ContextItem::new(ContextItemType::History, "[user]: hi".to_string(), 1.0),
            ],
            total_tokens: 10,
            budget_used: 0.1,
        };
        let rendered = window.format();
        let fact_pos = rendered.find("## 用户偏好").unwrap();
        let memory_pos = rendered.find("## 相关记忆").unwrap();
        let history_pos = rendered.find("## 对话历史").unwrap();
        assert!(fact_pos < memory_pos && memory_pos < history_pos);
    }

    #[test]
    fn test_retrieve_history_caps_to_candidate_count() {
        let events: Vec<Event> = (0..40)
            .map(|i| {
                let mut e = Event::draft(Author::User, cognis_core::EventType::Message, Value::from(format!("msg{i}")));
                e.sequence_num = i;
                e
            })
            .collect();
        let items = retrieve_history(&events, 10_000);
        assert_eq!(items.len(), HISTORY_CANDIDATES);
    }
}
