//! Sliding-window chunking for long documents. Grounded on
//! `examples/original_source/synthesis/src/embeddings/chunking.py`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub chunk_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub threshold: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            threshold: 4000,
            chunk_size: 2000,
            chunk_overlap: 400,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            ));
        }
        Ok(())
    }
}

pub fn should_chunk(content_length: usize, config: &ChunkingConfig) -> bool {
    content_length >= config.threshold
}

/// Split `content` into overlapping windows. Operates on `char` boundaries
/// throughout so offsets never land inside a multi-byte UTF-8 sequence.
///
/// Empty content yields an empty chunk list. Content strictly under the threshold
/// yields a single chunk spanning the whole text; content at or above the threshold
/// is split into windows. A final window shorter than
/// half the chunk size is absorbed into its predecessor by extending the
/// predecessor to the end of the content and re-slicing, rather than
/// concatenating the two chunk strings.
pub fn chunk_document(content: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let chars: Vec<char> = content.chars().collect();
    let content_length = chars.len();

    if content_length == 0 {
        return Vec::new();
    }

    if !should_chunk(content_length, config) {
        return vec![Chunk {
            text: content.to_string(),
            chunk_index: 0,
            start_offset: 0,
            end_offset: content_length,
        }];
    }

    let step = config.chunk_size - config.chunk_overlap;
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;

    while start < content_length {
        let end = (start + config.chunk_size).min(content_length);
        chunks.push(Chunk {
            text: chars[start..end].iter().collect(),
            chunk_index: index,
            start_offset: start,
            end_offset: end,
        });
        index += 1;
        if end == content_length {
            break;
        }
        start += step;
    }

    if chunks.len() > 1 {
        let last_len = chunks.last().unwrap().end_offset - chunks.last().unwrap().start_offset;
        if last_len < config.chunk_size / 2 {
            chunks.pop();
            let prev = chunks.last_mut().expect("chunked path always has >= 2 windows here");
            prev.end_offset = content_length;
            prev.text = chars[prev.start_offset..content_length].iter().collect();
        }
    }

    chunks
}

pub fn estimate_token_count(text: &str) -> usize {
    (text.chars().count() as f64 / 4.0).ceil() as usize
}

pub struct ChunkStatistics {
    pub total_chunks: usize,
    pub avg_chunk_size: f64,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
}

pub fn chunk_statistics(chunks: &[Chunk]) -> Option<ChunkStatistics> {
    if chunks.is_empty() {
        return None;
    }
    let sizes: Vec<usize> = chunks.iter().map(|c| c.end_offset - c.start_offset).collect();
    let total: usize = sizes.iter().sum();
    Some(ChunkStatistics {
        total_chunks: chunks.len(),
        avg_chunk_size: total as f64 / sizes.len() as f64,
        min_chunk_size: *sizes.iter().min().unwrap(),
        max_chunk_size: *sizes.iter().max().unwrap(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repeated(pattern: &str, target_len: usize) -> String {
        pattern.chars().cycle().take(target_len).collect()
    }

    #[test]
    fn empty_content_yields_no_chunks() {
        let config = ChunkingConfig::default();
        assert!(chunk_document("", &config).is_empty());
    }

    #[test]
    fn content_under_threshold_is_a_single_chunk() {
        let config = ChunkingConfig::default();
        let text = repeated("word ", config.threshold - 1);
        let chunks = chunk_document(&text, &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, text.chars().count());
    }

    #[test]
    fn content_at_threshold_is_split_into_multiple_chunks() {
        let config = ChunkingConfig::default();
        let text = repeated("word ", config.threshold);
        let chunks = chunk_document(&text, &config);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn long_content_produces_overlapping_windows() {
        let config = ChunkingConfig::default();
        let text = repeated("abcdefghij", 9000);
        let chunks = chunk_document(&text, &config);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset < pair[0].end_offset, "windows must overlap");
            assert_eq!(pair[0].chunk_index + 1, pair[1].chunk_index);
        }
        assert_eq!(chunks.last().unwrap().end_offset, text.chars().count());
    }

    #[test]
    fn short_tail_window_is_absorbed_into_predecessor() {
        let config = ChunkingConfig {
            threshold: 10,
            chunk_size: 100,
            chunk_overlap: 20,
        };
        // step = 80; length chosen so the final window would be a thin sliver
        let text = repeated("x", 170);
        let chunks = chunk_document(&text, &config);
        let last = chunks.last().unwrap();
        assert_eq!(last.end_offset, text.chars().count());
        assert!(last.end_offset - last.start_offset >= config.chunk_size / 2);
    }

    #[test]
    fn chunk_overlap_not_smaller_than_chunk_size_is_a_config_error() {
        let config = ChunkingConfig {
            threshold: 10,
            chunk_size: 100,
            chunk_overlap: 100,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn offsets_never_split_a_multibyte_char() {
        let config = ChunkingConfig {
            threshold: 5,
            chunk_size: 10,
            chunk_overlap: 2,
        };
        let text = "日本語".repeat(10);
        let chunks = chunk_document(&text, &config);
        for chunk in &chunks {
            assert_eq!(chunk.text.chars().count(), chunk.end_offset - chunk.start_offset);
        }
    }

    #[test]
    fn statistics_are_none_for_empty_chunk_list() {
        assert!(chunk_statistics(&[]).is_none());
    }
}
