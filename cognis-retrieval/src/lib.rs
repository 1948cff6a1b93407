//! # cognis-retrieval
//!
//! Hybrid search, RRF fusion, cross-encoder reranking, and prompt context
//! assembly: the two-stage retrieval path (L0 SQL recall, L1 rerank) and
//! the budget-apportioned window builder that sits on top of it.
//!
//! ## Overview
//!
//! - [`HybridSearch`] / [`PgHybridSearch`] (feature `postgres`) — L0 recall
//! - [`rrf::rrf_fusion`] — Reciprocal Rank Fusion across ranked lists
//! - [`RerankPipeline`] — L1 cross-encoder stage, pluggable via
//!   [`cognis_core::Reranker`]
//! - [`ContextAssembler`] / [`ContextWindow`] — budgeted prompt assembly

pub mod context;
pub mod hybrid;
pub mod rerank;
pub mod rrf;
pub mod types;

pub use context::{estimate_tokens, ContextAssembler, ContextItem, ContextItemType, ContextWindow};
pub use hybrid::{combined_score, HybridSearch};
pub use rerank::RerankPipeline;
pub use rrf::{rrf_fusion, DEFAULT_K};
pub use types::{HybridSearchResult, RerankedResult, RrfResult, SearchResult};

#[cfg(feature = "postgres")]
pub use hybrid::PgHybridSearch;
