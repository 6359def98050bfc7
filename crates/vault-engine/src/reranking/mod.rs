pub mod cross_encoder;

pub use cross_encoder::CrossEncoderReranker;

use async_trait::async_trait;

/// Scores `(query, candidate text)` pairs for the pipeline's optional rerank
/// stage. Grounded on `examples/original_source/src/temoa/reranker.py`'s
/// `CrossEncoderReranker.rerank` contract, generalized behind a trait so the
/// pipeline never depends on a concrete model backend.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn score(&self, query: &str, texts: &[&str]) -> anyhow::Result<Vec<f32>>;
}
