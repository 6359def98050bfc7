use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub enum HybridSource {
    Vector,
    TextSearch,
    Both,
}

/// Reciprocal Rank Fusion — merges ranked lists without score normalization.
/// Formula: rrf_score(doc) = Σ 1/(k + rank_i) for each list containing doc
pub fn reciprocal_rank_fusion(
    vector_results: Vec<(String, f32)>,
    fts_results: Vec<(String, f32)>,
    k: usize,
    top_k: usize,
) -> Vec<(String, f32, HybridSource)> {
    let mut scores: HashMap<String, (f32, HybridSource)> = HashMap::new();

    for (rank, (id, _score)) in vector_results.iter().enumerate() {
        let rrf = 1.0 / (k as f32 + rank as f32 + 1.0);
        scores
            .entry(id.clone())
            .and_modify(|(s, src)| {
                *s += rrf;
                *src = HybridSource::Both;
            })
            .or_insert((rrf, HybridSource::Vector));
    }

    for (rank, (id, _score)) in fts_results.iter().enumerate() {
        let rrf = 1.0 / (k as f32 + rank as f32 + 1.0);
        scores
            .entry(id.clone())
            .and_modify(|(s, src)| {
                *s += rrf;
                *src = HybridSource::Both;
            })
            .or_insert((rrf, HybridSource::TextSearch));
    }

    let mut merged: Vec<(String, f32, HybridSource)> = scores
        .into_iter()
        .map(|(id, (score, source))| (id, score, source))
        .collect();

    merged.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(top_k);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fusion_favors_docs_ranked_highly_in_both_lists() {
        let vector = vec![("a".to_string(), 0.9), ("b".to_string(), 0.5)];
        let lexical = vec![("b".to_string(), 5.0), ("a".to_string(), 1.0)];
        let merged = reciprocal_rank_fusion(vector, lexical, 60, 10);
        assert_eq!(merged.len(), 2);
        // both docs appear in both lists at symmetric ranks, so scores tie —
        // just assert both survive with a combined (Both) source.
        assert!(merged.iter().all(|(_, _, src)| matches!(src, HybridSource::Both)));
    }

    #[test]
    fn fusion_respects_top_k_truncation() {
        let vector: Vec<(String, f32)> = (0..20).map(|i| (i.to_string(), 1.0)).collect();
        let merged = reciprocal_rank_fusion(vector, Vec::new(), 60, 5);
        assert_eq!(merged.len(), 5);
    }
}
