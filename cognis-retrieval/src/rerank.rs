use std::sync::Arc;

use cognis_core::{Reranker, Result};

use crate::types::{HybridSearchResult, RerankedResult};

/// Two-stage retrieval: L0 hybrid recall narrowed to `l0_limit` candidates,
/// then an L1 cross-encoder pass narrows to `l1_limit` (spec §4.5, "Rerank
/// (L1)"). The cross-encoder itself is an external collaborator — only its
/// [`Reranker`] contract is implemented here.
pub struct RerankPipeline {
    reranker: Arc<dyn Reranker>,
}

impl RerankPipeline {
    pub fn new(reranker: Arc<dyn Reranker>) -> Self {
        Self { reranker }
    }

    /// Scores every `candidate` against `query`, then returns the top
    /// `l1_limit` sorted by `rerank_score` descending (spec §4.5: "the
    /// contract is `rerank(query, [{id, content, score}]) → [{id, content,
    /// original_score, rerank_score}]` sorted by `rerank_score` desc").
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<HybridSearchResult>,
        l1_limit: usize,
    ) -> Result<Vec<RerankedResult>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let contents: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        let rerank_scores = self.reranker.rerank(query, &contents).await?;

        let mut results: Vec<RerankedResult> = candidates
            .into_iter()
            .zip(rerank_scores)
            .map(|(candidate, rerank_score)| RerankedResult {
                id: candidate.id,
                content: candidate.content,
                original_score: candidate.combined_score,
                rerank_score: rerank_score as f64,
                metadata: candidate.metadata,
            })
            .collect();

        results.sort_by(|a, b| b.rerank_score.partial_cmp(&a.rerank_score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(l1_limit);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct ReverseOrderReranker;

    #[async_trait]
    impl Reranker for ReverseOrderReranker {
        async fn rerank(&self, _query: &str, candidates: &[String]) -> Result<Vec<f32>> {
            Ok((0..candidates.len()).rev().map(|i| i as f32).collect())
        }
    }

    fn candidate(content: &str) -> HybridSearchResult {
        HybridSearchResult {
            id: Uuid::new_v4(),
            content: content.to_string(),
            semantic_score: 0.5,
            keyword_score: 0.5,
            combined_score: 0.5,
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_rerank_reorders_by_rerank_score() {
        let pipeline = RerankPipeline::new(Arc::new(ReverseOrderReranker));
        let candidates = vec![candidate("first"), candidate("second"), candidate("third")];
        let reranked = pipeline.rerank("q", candidates, 10).await.unwrap();
        assert_eq!(reranked[0].content, "first");
        assert_eq!(reranked.last().unwrap().content, "third");
    }

    #[tokio::test]
    async fn test_rerank_respects_l1_limit() {
        let pipeline = RerankPipeline::new(Arc::new(ReverseOrderReranker));
        let candidates: Vec<_> = (0..20).map(|i| candidate(&i.to_string())).collect();
        let reranked = pipeline.rerank("q", candidates, 5).await.unwrap();
        assert_eq!(reranked.len(), 5);
    }

    #[tokio::test]
    async fn test_rerank_empty_candidates() {
        let pipeline = RerankPipeline::new(Arc::new(ReverseOrderReranker));
        assert!(pipeline.rerank("q", Vec::new(), 10).await.unwrap().is_empty());
    }
}
