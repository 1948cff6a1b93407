use serde_json::{Map, Value};
use uuid::Uuid;

/// A single candidate from either an L0 hybrid recall or an individual
/// ranked list fed into [`crate::rrf::rrf_fusion`] (spec §4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: Uuid,
    pub content: String,
    pub score: f64,
    pub metadata: Map<String, Value>,
}

impl SearchResult {
    pub fn new(id: Uuid, content: impl Into<String>, score: f64) -> Self {
        Self { id, content: content.into(), score, metadata: Map::new() }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Row shape returned by the `hybrid_search` SQL function (spec §6):
/// semantic and keyword scores are kept alongside the blended
/// `combined_score` so callers can inspect either signal.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridSearchResult {
    pub id: Uuid,
    pub content: String,
    pub semantic_score: f64,
    pub keyword_score: f64,
    pub combined_score: f64,
    pub metadata: Map<String, Value>,
}

impl HybridSearchResult {
    pub fn into_search_result(self) -> SearchResult {
        SearchResult { id: self.id, content: self.content, score: self.combined_score, metadata: self.metadata }
    }
}

/// The result of a `rrf_search` fusion or [`crate::rrf::rrf_fusion`] call
/// (spec §4.5, "RRF fusion").
#[derive(Debug, Clone, PartialEq)]
pub struct RrfResult {
    pub id: Uuid,
    pub content: String,
    pub rrf_score: f64,
    pub metadata: Map<String, Value>,
}

/// The output of the L1 cross-encoder stage: each candidate keeps its L0
/// score alongside the reranker's own score so callers can compare the two
/// (spec §4.5, "Rerank (L1)").
#[derive(Debug, Clone, PartialEq)]
pub struct RerankedResult {
    pub id: Uuid,
    pub content: String,
    pub original_score: f64,
    pub rerank_score: f64,
    pub metadata: Map<String, Value>,
}
