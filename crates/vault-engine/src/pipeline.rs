//! The hybrid search pipeline: RRF fusion, tag-boost amplification, on-demand
//! similarity enrichment, time decay, optional reranking, dedup, and
//! query-aware snippet extraction. Grounded end-to-end on
//! `examples/original_source/src/temoa/synthesis.py`'s `hybrid_search` /
//! `deduplicate_chunks` / `extract_relevant_snippet`, with RRF itself reused
//! from `search/hybrid.rs`'s `reciprocal_rank_fusion`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::time::Instant;

use crate::encoder::Encoder;
use crate::errors::EngineError;
use crate::index_manager::{semantic_scan, IndexSnapshot};
use crate::profiles::SearchProfile;
use crate::reranking::Reranker;
use crate::search::reciprocal_rank_fusion;

const RRF_K: usize = 60;
const TOP10_TAG_BOOST_WINDOW: usize = 10;
const SNIPPET_RADIUS: usize = 150;

/// A single flat diagnostic record. Every scoring stage writes into the same
/// struct rather than handing off between distinct per-stage types, so the
/// full provenance of a ranking decision survives to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub relative_path: String,
    pub title: String,
    pub snippet: String,
    pub row_index: usize,
    pub chunk_index: usize,
    pub row_total_chunks: usize,

    pub rrf_score: Option<f32>,
    pub similarity_score: Option<f32>,
    pub bm25_score: Option<f32>,
    pub bm25_base_score: Option<f32>,
    pub tags_matched: Option<Vec<String>>,
    pub time_boost: Option<f64>,
    pub days_old: Option<f64>,
    pub cross_encoder_score: Option<f32>,
    pub tag_boosted: Option<bool>,
    pub matched_chunks: Option<usize>,
    pub is_chunked_file: Option<bool>,
    pub best_chunk_index: Option<usize>,
    pub total_file_chunks: Option<usize>,
    pub timed_out: Option<bool>,
}

impl Candidate {
    fn ranking_score(&self) -> f32 {
        self.rrf_score
            .or(self.similarity_score)
            .or(self.bm25_score)
            .unwrap_or(0.0)
    }
}

pub struct SearchPipeline<'a> {
    pub snapshot: &'a IndexSnapshot,
    pub encoder: &'a dyn Encoder,
    pub reranker: Option<&'a dyn Reranker>,
    pub today: NaiveDate,
}

#[derive(Debug, Clone, Copy)]
pub enum DedupMode {
    Best,
    All,
}

pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub limit: usize,
    pub profile: &'a SearchProfile,
    pub dedup_mode: DedupMode,
    pub max_chunks_per_file: usize,
    pub deadline: Option<Instant>,
}

pub struct PipelineResult {
    pub candidates: Vec<Candidate>,
    pub timed_out: bool,
}

impl<'a> SearchPipeline<'a> {
    fn deadline_passed(deadline: Option<Instant>) -> bool {
        deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub async fn search(&self, request: &SearchRequest<'_>) -> Result<PipelineResult, EngineError> {
        if self.snapshot.is_empty() {
            return Ok(PipelineResult {
                candidates: Vec::new(),
                timed_out: false,
            });
        }

        let fetch_limit = request.limit * 3;

        let query_vector = self
            .encoder
            .embed_one(request.query)
            .map_err(|_| EngineError::IndexUnavailable { which: "semantic" })?;

        let semantic_hits = semantic_scan(self.snapshot, &query_vector, fetch_limit);
        let lexical_hits = self
            .snapshot
            .lexical
            .search(
                request.query,
                fetch_limit,
                crate::search::lexical::DEFAULT_MIN_SCORE,
                crate::search::lexical::DEFAULT_TAG_BOOST,
            )
            .map_err(|e| EngineError::Index {
                detail: format!("lexical search failed: {e}"),
            })?;

        if Self::deadline_passed(request.deadline) {
            return Ok(PipelineResult {
                candidates: Vec::new(),
                timed_out: true,
            });
        }

        // Fusion is keyed by `relative_path`, not row index, so that multiple
        // matching chunks of the same file sum their RRF contributions under
        // one document rather than competing as distinct entries.
        let semantic_ranked: Vec<(String, f32)> = semantic_hits
            .iter()
            .map(|(row, score)| (self.snapshot.rows[*row].relative_path.clone(), *score))
            .collect();
        let lexical_ranked: Vec<(String, f32)> = lexical_hits
            .iter()
            .filter(|h| h.row_index < self.snapshot.rows.len())
            .map(|h| (self.snapshot.rows[h.row_index].relative_path.clone(), h.bm25_score))
            .collect();

        let fused = reciprocal_rank_fusion(semantic_ranked, lexical_ranked, RRF_K, fetch_limit);

        // Representative row per file: first occurrence wins, semantic hits
        // considered before lexical hits (mirrors the source merge's
        // doc-data-first-wins rule).
        let mut representative_row: HashMap<String, usize> = HashMap::new();
        for (row_index, _) in &semantic_hits {
            let path = &self.snapshot.rows[*row_index].relative_path;
            representative_row.entry(path.clone()).or_insert(*row_index);
        }
        for hit in &lexical_hits {
            if hit.row_index >= self.snapshot.rows.len() {
                continue;
            }
            let path = &self.snapshot.rows[hit.row_index].relative_path;
            representative_row.entry(path.clone()).or_insert(hit.row_index);
        }

        let mut lexical_by_path: HashMap<&str, &crate::search::LexicalHit> = HashMap::new();
        for hit in &lexical_hits {
            if hit.row_index >= self.snapshot.rows.len() {
                continue;
            }
            let path = self.snapshot.rows[hit.row_index].relative_path.as_str();
            lexical_by_path.entry(path).or_insert(hit);
        }

        let semantic_paths: std::collections::HashSet<String> = semantic_hits
            .iter()
            .map(|(row, _)| self.snapshot.rows[*row].relative_path.clone())
            .collect();

        let mut candidates: Vec<Candidate> = Vec::with_capacity(fused.len());
        for (path, rrf_score, _source) in &fused {
            let Some(&row_index) = representative_row.get(path) else {
                continue;
            };
            let row = &self.snapshot.rows[row_index];
            let lexical_hit = lexical_by_path.get(path.as_str()).copied();
            candidates.push(Candidate {
                relative_path: row.relative_path.clone(),
                title: row.title.clone(),
                snippet: row.content.clone(),
                row_index,
                chunk_index: row.chunk_index,
                row_total_chunks: row.total_chunks,
                rrf_score: Some(*rrf_score),
                similarity_score: None,
                bm25_score: lexical_hit.map(|h| h.bm25_score),
                bm25_base_score: lexical_hit.map(|h| h.bm25_base_score),
                tags_matched: lexical_hit.map(|h| h.tags_matched.clone()),
                time_boost: None,
                days_old: None,
                cross_encoder_score: None,
                tag_boosted: Some(false),
                matched_chunks: None,
                is_chunked_file: None,
                best_chunk_index: None,
                total_file_chunks: None,
                timed_out: Some(false),
            });
        }

        apply_tag_boost(&mut candidates, &lexical_hits, &semantic_paths, self.snapshot);

        if Self::deadline_passed(request.deadline) {
            for c in &mut candidates {
                c.timed_out = Some(true);
            }
            return Ok(PipelineResult {
                candidates,
                timed_out: true,
            });
        }

        self.enrich_similarity(&mut candidates, &query_vector);

        if let Some(decay) = request.profile.time_decay {
            apply_time_decay(
                &mut candidates,
                self.snapshot,
                self.today,
                decay.half_life_days,
                decay.max_boost,
                request.profile.max_age_days,
            );
        }

        if request.profile.cross_encoder {
            if let Some(reranker) = self.reranker {
                if !Self::deadline_passed(request.deadline) {
                    rerank_top_candidates(&mut candidates, reranker, request.query).await;
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.ranking_score()
                .partial_cmp(&a.ranking_score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        });

        let deduped = deduplicate_chunks(candidates, request.dedup_mode, request.max_chunks_per_file);

        let mut results: Vec<Candidate> = deduped.into_iter().take(request.limit).collect();
        for c in &mut results {
            c.snippet = extract_relevant_snippet(&c.snippet, request.query);
        }

        Ok(PipelineResult {
            candidates: results,
            timed_out: false,
        })
    }

    fn enrich_similarity(&self, candidates: &mut [Candidate], query_vector: &[f32]) {
        for c in candidates.iter_mut() {
            if c.similarity_score.is_none() {
                let row_vec = self.snapshot.row_vector(c.row_index);
                let dot: f32 = row_vec.iter().zip(query_vector.iter()).map(|(a, b)| a * b).sum();
                c.similarity_score = Some(dot);
            }
        }
    }
}

/// Top-10 lexical hits with a tag match get their fused score replaced by
/// `max_rrf * (1.5 + 0.5 * bm25/max_bm25)` (range 1.5x-2x) and are flagged
/// `tag_boosted`. Top lexical hits with no tag match that never made the
/// semantic list get a conservative score of `max_rrf * (bm25/max_bm25) * 0.95`
/// instead of being left at zero. Keyed by `relative_path` to match the fused
/// candidate list.
fn apply_tag_boost(
    candidates: &mut [Candidate],
    lexical_hits: &[crate::search::LexicalHit],
    semantic_paths: &std::collections::HashSet<String>,
    snapshot: &IndexSnapshot,
) {
    let top10 = &lexical_hits[..lexical_hits.len().min(TOP10_TAG_BOOST_WINDOW)];
    let max_bm25 = top10.iter().map(|h| h.bm25_score).fold(0.0f32, f32::max);
    if max_bm25 <= 0.0 {
        return;
    }
    let max_rrf = candidates
        .iter()
        .filter_map(|c| c.rrf_score)
        .fold(0.0f32, f32::max);

    let mut by_path: HashMap<String, &mut Candidate> =
        candidates.iter_mut().map(|c| (c.relative_path.clone(), c)).collect();

    for hit in top10 {
        if hit.row_index >= snapshot.rows.len() {
            continue;
        }
        let path = &snapshot.rows[hit.row_index].relative_path;
        if !hit.tags_matched.is_empty() {
            if let Some(c) = by_path.get_mut(path) {
                let multiplier = 1.5 + 0.5 * (hit.bm25_score / max_bm25);
                c.rrf_score = Some(max_rrf * multiplier);
                c.tag_boosted = Some(true);
            }
        } else if !semantic_paths.contains(path) {
            if let Some(c) = by_path.get_mut(path) {
                c.rrf_score = Some(max_rrf * (hit.bm25_score / max_bm25) * 0.95);
            }
        }
    }
}

/// `boost = max_boost * 0.5^(days_old / half_life_days)`,
/// `boosted = original * (1 + boost)`. `max_age_days` is a hard pre-decay
/// cutoff — candidates older than it are dropped outright, not merely scored
/// down.
fn apply_time_decay(
    candidates: &mut Vec<Candidate>,
    snapshot: &IndexSnapshot,
    today: NaiveDate,
    half_life_days: f64,
    max_boost: f64,
    max_age_days: Option<u32>,
) {
    candidates.retain_mut(|c| {
        let Ok(created) = NaiveDate::parse_from_str(&snapshot.rows[c.row_index].created_date, "%Y-%m-%d") else {
            return true;
        };
        let days_old = (today - created).num_days().max(0) as f64;

        if let Some(max_age) = max_age_days {
            if days_old > max_age as f64 {
                return false;
            }
        }

        let boost = max_boost * 0.5f64.powf(days_old / half_life_days);
        let original = c.ranking_score() as f64;
        c.rrf_score = Some((original * (1.0 + boost)) as f32);
        c.time_boost = Some(boost);
        c.days_old = Some(days_old);
        true
    });
}

async fn rerank_top_candidates(candidates: &mut [Candidate], reranker: &dyn Reranker, query: &str) {
    let rerank_top_n = candidates.len().min(100);
    let texts: Vec<&str> = candidates[..rerank_top_n].iter().map(|c| c.snippet.as_str()).collect();
    match reranker.score(query, &texts).await {
        Ok(scores) => {
            for (c, score) in candidates[..rerank_top_n].iter_mut().zip(scores) {
                c.cross_encoder_score = Some(score);
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "cross-encoder rerank failed, ranking unaffected");
        }
    }
}

/// Group by `relative_path`, keep the best chunk (`best`) or up to
/// `max_chunks_per_file` chunks (`all`), annotating `matched_chunks`,
/// `is_chunked_file`, `best_chunk_index`, `total_file_chunks`.
fn deduplicate_chunks(candidates: Vec<Candidate>, mode: DedupMode, max_chunks_per_file: usize) -> Vec<Candidate> {
    let mut groups: HashMap<String, Vec<Candidate>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for c in candidates {
        if !groups.contains_key(&c.relative_path) {
            order.push(c.relative_path.clone());
        }
        groups.entry(c.relative_path.clone()).or_default().push(c);
    }

    let mut out = Vec::new();
    for path in order {
        let mut group = groups.remove(&path).unwrap();
        group.sort_by(|a, b| {
            b.ranking_score()
                .partial_cmp(&a.ranking_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let total_file_chunks = group.first().map(|c| c.row_total_chunks).unwrap_or(1);
        let matched_chunks = group.len();
        let is_chunked = total_file_chunks > 1;

        match mode {
            DedupMode::Best => {
                if let Some(mut best) = group.into_iter().next() {
                    best.matched_chunks = Some(matched_chunks);
                    best.is_chunked_file = Some(is_chunked);
                    best.best_chunk_index = Some(best.chunk_index);
                    best.total_file_chunks = Some(total_file_chunks);
                    out.push(best);
                }
            }
            DedupMode::All => {
                let best_chunk_index = group.first().map(|c| c.chunk_index).unwrap_or(0);
                for mut c in group.into_iter().take(max_chunks_per_file) {
                    c.matched_chunks = Some(matched_chunks);
                    c.is_chunked_file = Some(is_chunked);
                    c.best_chunk_index = Some(best_chunk_index);
                    c.total_file_chunks = Some(total_file_chunks);
                    out.push(c);
                }
            }
        }
    }

    out.sort_by(|a, b| {
        b.ranking_score()
            .partial_cmp(&a.ranking_score())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.relative_path.cmp(&b.relative_path))
    });
    out
}

/// Centers a window of `SNIPPET_RADIUS` characters on either side of the
/// first query-token match, trimmed to word boundaries with an ellipsis on
/// whichever side was cut.
fn extract_relevant_snippet(content: &str, query: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= SNIPPET_RADIUS * 2 {
        return content.to_string();
    }

    let lower_content = content.to_lowercase();
    let query_tokens: Vec<&str> = query.split_whitespace().collect();
    let match_char_index = query_tokens
        .iter()
        .find_map(|token| lower_content.find(&token.to_lowercase()))
        .map(|byte_idx| lower_content[..byte_idx].chars().count());

    let center = match_char_index.unwrap_or(0);
    let mut start = center.saturating_sub(SNIPPET_RADIUS);
    let mut end = (center + SNIPPET_RADIUS).min(chars.len());

    while start > 0 && !chars[start].is_whitespace() {
        start -= 1;
    }
    while end < chars.len() && !chars[end].is_whitespace() {
        end += 1;
    }

    let mut snippet: String = chars[start..end].iter().collect();
    if start > 0 {
        snippet = format!("...{}", snippet.trim_start());
    }
    if end < chars.len() {
        snippet = format!("{}...", snippet.trim_end());
    }
    snippet
}

pub const DEFAULT_MAX_CHUNKS_PER_FILE: usize = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(path: &str, row_index: usize, score: f32) -> Candidate {
        Candidate {
            relative_path: path.to_string(),
            title: path.to_string(),
            snippet: "content".to_string(),
            row_index,
            chunk_index: 0,
            row_total_chunks: 1,
            rrf_score: Some(score),
            similarity_score: None,
            bm25_score: None,
            bm25_base_score: None,
            tags_matched: None,
            time_boost: None,
            days_old: None,
            cross_encoder_score: None,
            tag_boosted: Some(false),
            matched_chunks: None,
            is_chunked_file: None,
            best_chunk_index: None,
            total_file_chunks: None,
            timed_out: Some(false),
        }
    }

    #[test]
    fn dedup_best_keeps_highest_scoring_chunk_per_file() {
        let candidates = vec![
            candidate("a.md", 0, 0.2),
            candidate("a.md", 1, 0.9),
            candidate("b.md", 2, 0.5),
        ];
        let result = deduplicate_chunks(candidates, DedupMode::Best, 3);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].relative_path, "a.md");
        assert_eq!(result[0].matched_chunks, Some(2));
        assert_eq!(result[0].is_chunked_file, Some(false));
    }

    #[test]
    fn dedup_all_caps_at_max_chunks_per_file() {
        let candidates = vec![
            candidate("a.md", 0, 0.9),
            candidate("a.md", 1, 0.8),
            candidate("a.md", 2, 0.7),
            candidate("a.md", 3, 0.6),
        ];
        let mut candidates = candidates;
        for c in &mut candidates {
            c.row_total_chunks = 4;
        }
        let result = deduplicate_chunks(candidates, DedupMode::All, 2);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].is_chunked_file, Some(true));
    }

    #[test]
    fn snippet_extraction_centers_on_query_match_with_ellipsis() {
        let content = "x".repeat(400) + "needle" + &"y".repeat(400);
        let snippet = extract_relevant_snippet(&content, "needle");
        assert!(snippet.contains("needle"));
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
    }

    #[test]
    fn short_content_is_returned_unmodified() {
        let content = "short note body";
        assert_eq!(extract_relevant_snippet(content, "note"), content);
    }
}
