//! Tag-aware layer over the Tantivy-backed `TextSearch` wrapper. Grounded on
//! `examples/original_source/src/temoa/bm25_index.py`'s `BM25Index.build`/`search` —
//! specifically its title+tags+description+content indexed-text weighting, its
//! tag-boost multiplier, and its exact/substring tag-match detection with
//! deterministic tie-break by insertion order, which the underlying Tantivy
//! collector does not give us for free.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;

use super::text_search::TextSearch;

/// Multiplies the raw BM25 score when a query token matches one of the
/// document's tags, matching `bm25_index.py::search`'s `tag_boost` default.
pub const DEFAULT_TAG_BOOST: f32 = 5.0;
/// Raw BM25 scores at or below this are dropped, matching `min_score`'s default.
pub const DEFAULT_MIN_SCORE: f32 = 0.0;

#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub id: String,
    pub bm25_score: f32,
    pub bm25_base_score: f32,
    pub tags_matched: Vec<String>,
    pub row_index: usize,
}

struct RowInfo {
    tags: Vec<String>,
    row_index: usize,
}

pub struct LexicalIndex {
    text_search: TextSearch,
    rows: RwLock<HashMap<String, RowInfo>>,
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

impl LexicalIndex {
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self {
            text_search: TextSearch::new(path)?,
            rows: RwLock::new(HashMap::new()),
        })
    }

    /// Indexes `content` under a combined text blob weighted per
    /// `bm25_index.py::build`: title + tags (doubled) + description (doubled)
    /// + content, so BM25 term frequency gives tags and the curated
    /// description extra weight over plain body text.
    pub fn index_row(
        &self,
        id: &str,
        content: &str,
        title: &str,
        source: &str,
        tags: &[String],
        description: &str,
        row_index: usize,
    ) -> Result<()> {
        let weighted_text = build_weighted_text(title, tags, description, content);
        self.text_search.index_chunk(id, &weighted_text, title, source)?;
        self.rows
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                id.to_string(),
                RowInfo {
                    tags: tags.to_vec(),
                    row_index,
                },
            );
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.text_search.commit()
    }

    pub fn delete_by_id(&self, id: &str) -> Result<()> {
        self.text_search.delete_by_id(id)?;
        self.rows.write().unwrap_or_else(|e| e.into_inner()).remove(id);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.text_search.clear()?;
        self.rows.write().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }

    /// BM25 search annotated with exact/substring tag matches against the
    /// query's lowercase tokens, sorted by score descending with a
    /// deterministic ascending-`row_index` tie-break. Raw scores at or below
    /// `min_score` are dropped; a tag match multiplies the raw score by
    /// `tag_boost`, with the pre-boost score preserved as `bm25_base_score`.
    pub fn search(&self, query: &str, k: usize, min_score: f32, tag_boost: f32) -> Result<Vec<LexicalHit>> {
        let query_tokens = tokenize(query);
        let raw = self.text_search.search(query, k)?;
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());

        let mut hits: Vec<LexicalHit> = raw
            .into_iter()
            .filter(|(_, score)| *score > min_score)
            .map(|(id, base_score)| {
                let (tags_matched, row_index) = match rows.get(&id) {
                    Some(info) => (matched_tags(&info.tags, &query_tokens), info.row_index),
                    None => (Vec::new(), usize::MAX),
                };
                let bm25_score = if tag_boost > 1.0 && !tags_matched.is_empty() {
                    base_score * tag_boost
                } else {
                    base_score
                };
                LexicalHit {
                    id,
                    bm25_score,
                    bm25_base_score: base_score,
                    tags_matched,
                    row_index,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.bm25_score
                .partial_cmp(&a.bm25_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.row_index.cmp(&b.row_index))
        });

        Ok(hits)
    }
}

/// `title + tags*2 + description*2 + content`, whitespace-joined — mirrors
/// `bm25_index.py::build`'s corpus text exactly, including repeating the
/// whole tag list (not each tag individually) to double its term frequency.
fn build_weighted_text(title: &str, tags: &[String], description: &str, content: &str) -> String {
    let tags_joined = tags.join(" ");
    let tags_text = if tags.is_empty() {
        String::new()
    } else {
        format!("{tags_joined} {tags_joined}")
    };
    let description_text = if description.is_empty() {
        String::new()
    } else {
        format!("{description} {description}")
    };
    format!("{title} {tags_text} {description_text} {content}")
}

/// A tag matches if a query token equals it exactly, or if the token is a
/// substring of it. Exact matches are reported; an exact match on a tag
/// short-circuits checking it again for substring.
fn matched_tags(tags: &[String], query_tokens: &[String]) -> Vec<String> {
    let mut matched = Vec::new();
    for tag in tags {
        let tag_lower = tag.to_lowercase();
        let is_match = query_tokens.iter().any(|qt| {
            qt == &tag_lower || tag_lower.contains(qt.as_str())
        });
        if is_match {
            matched.push(tag.clone());
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn tags_matched_are_reported_exact_and_substring() {
        let tags = vec!["rust".to_string(), "async-runtime".to_string()];
        let query_tokens = tokenize("rust runtime patterns");
        let matched = matched_tags(&tags, &query_tokens);
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn search_results_tie_break_by_row_index() -> Result<()> {
        let dir = tempdir().unwrap();
        let index = LexicalIndex::new(dir.path().to_str().unwrap())?;
        index.index_row("b", "identical text here", "B", "b.md", &[], "", 5)?;
        index.index_row("a", "identical text here", "A", "a.md", &[], "", 1)?;
        index.commit()?;

        let hits = index.search("identical text", 10, DEFAULT_MIN_SCORE, DEFAULT_TAG_BOOST)?;
        assert!(hits.len() >= 2);
        // Equal BM25 scores for identical content — row_index breaks the tie.
        if (hits[0].bm25_score - hits[1].bm25_score).abs() < 1e-6 {
            assert!(hits[0].row_index < hits[1].row_index);
        }
        Ok(())
    }

    #[test]
    fn deleted_rows_lose_their_tag_metadata() -> Result<()> {
        let dir = tempdir().unwrap();
        let index = LexicalIndex::new(dir.path().to_str().unwrap())?;
        index.index_row("a", "hello world", "A", "a.md", &["greeting".to_string()], "", 0)?;
        index.commit()?;
        index.delete_by_id("a")?;
        index.commit()?;
        let hits = index.search("hello", 10, DEFAULT_MIN_SCORE, DEFAULT_TAG_BOOST)?;
        assert!(hits.is_empty());
        Ok(())
    }

    #[test]
    fn tag_match_multiplies_score_by_tag_boost() -> Result<()> {
        let dir = tempdir().unwrap();
        let index = LexicalIndex::new(dir.path().to_str().unwrap())?;
        index.index_row("a", "some unrelated content", "A", "a.md", &["rust".to_string()], "", 0)?;
        index.commit()?;

        let hits = index.search("rust", 10, DEFAULT_MIN_SCORE, DEFAULT_TAG_BOOST)?;
        assert_eq!(hits.len(), 1);
        assert!(!hits[0].tags_matched.is_empty());
        assert!((hits[0].bm25_score - hits[0].bm25_base_score * DEFAULT_TAG_BOOST).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn description_terms_are_lexically_findable() -> Result<()> {
        let dir = tempdir().unwrap();
        let index = LexicalIndex::new(dir.path().to_str().unwrap())?;
        index.index_row(
            "a",
            "body text with no mention of the topic",
            "A",
            "a.md",
            &[],
            "a curated summary about falconry",
            0,
        )?;
        index.commit()?;

        let hits = index.search("falconry", 10, DEFAULT_MIN_SCORE, DEFAULT_TAG_BOOST)?;
        assert_eq!(hits.len(), 1);
        Ok(())
    }
}
