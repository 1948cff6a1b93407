use std::collections::HashMap;

use uuid::Uuid;

use crate::types::{RrfResult, SearchResult};

/// Smoothing constant from the original `rrf_fusion` implementation (spec
/// §4.5: "k=60").
pub const DEFAULT_K: u32 = 60;

/// Merges independently ranked candidate lists by Reciprocal Rank Fusion:
/// `rrf(d) = Σ 1 / (k + rank_i(d))` over every list `d` appears in (spec
/// §4.5, "RRF fusion"). Each input list is assumed already sorted by its own
/// relevance signal — rank is derived from position, not from `score`.
pub fn rrf_fusion(result_lists: &[Vec<SearchResult>], k: u32, limit: usize) -> Vec<RrfResult> {
    let mut scores: HashMap<Uuid, f64> = HashMap::new();
    let mut first_seen: HashMap<Uuid, &SearchResult> = HashMap::new();

    for results in result_lists {
        for (index, result) in results.iter().enumerate() {
            let rank = (index + 1) as f64;
            *scores.entry(result.id).or_insert(0.0) += 1.0 / (k as f64 + rank);
            first_seen.entry(result.id).or_insert(result);
        }
    }

    let mut fused: Vec<RrfResult> = scores
        .into_iter()
        .map(|(id, rrf_score)| {
            let source = first_seen[&id];
            RrfResult { id, content: source.content.clone(), rrf_score, metadata: source.metadata.clone() }
        })
        .collect();

    fused.sort_by(|a, b| b.rrf_score.partial_cmp(&a.rrf_score).unwrap_or(std::cmp::Ordering::Equal));
    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: Uuid, content: &str, score: f64) -> SearchResult {
        SearchResult::new(id, content, score)
    }

    #[test]
    fn test_rrf_fusion_boosts_docs_present_in_both_lists() {
        let doc1 = Uuid::new_v4();
        let doc2 = Uuid::new_v4();
        let doc3 = Uuid::new_v4();
        let doc4 = Uuid::new_v4();

        let semantic = vec![result(doc1, "a", 0.95), result(doc2, "b", 0.90), result(doc3, "c", 0.85)];
        let keyword = vec![result(doc2, "b", 0.88), result(doc4, "d", 0.85), result(doc1, "a", 0.80)];

        let fused = rrf_fusion(&[semantic, keyword], DEFAULT_K, 10);

        // doc2 appears at rank 2 in one list and rank 1 in the other: highest combined score.
        assert_eq!(fused[0].id, doc2);
    }

    #[test]
    fn test_rrf_fusion_respects_limit() {
        let lists = vec![(0..20).map(|_| result(Uuid::new_v4(), "x", 1.0)).collect()];
        let fused = rrf_fusion(&lists, DEFAULT_K, 5);
        assert_eq!(fused.len(), 5);
    }

    #[test]
    fn test_rrf_fusion_empty_input() {
        assert!(rrf_fusion(&[], DEFAULT_K, 10).is_empty());
    }

    #[test]
    fn test_rrf_fusion_single_list_preserves_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let fused = rrf_fusion(&[vec![result(a, "a", 1.0), result(b, "b", 0.5)]], DEFAULT_K, 10);
        assert_eq!(fused[0].id, a);
        assert_eq!(fused[1].id, b);
    }
}
