use crate::errors::EngineError;

/// Text-to-vector black box. Owned by the service, handed as an explicit dependency
/// to `IndexManager` and `SearchPipeline` — never constructed on the query path.
///
/// Implementations are expected to return unit-normalized (L2) vectors so that
/// downstream cosine similarity reduces to a plain dot product.
pub trait Encoder: Send + Sync {
    /// Stable identifier stamped into index metadata (`encoder_name`).
    fn name(&self) -> &str;

    /// Fixed output dimension D.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts in one call. Implementations that are not
    /// internally thread-safe should serialize this through their own worker;
    /// callers are expected to hold a single `Arc<dyn Encoder>` and never spin
    /// up parallel instances.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EngineError>;

    /// Convenience for the single-text case (query embedding).
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        let mut rows = self.embed(&[text])?;
        rows.pop().ok_or_else(|| EngineError::Encoder {
            detail: "encoder returned no rows for a single-text batch".to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Deterministic hashing "encoder" for tests: no model weights, no I/O,
    /// stable across runs. Not unit-normalized input-independent — it normalizes
    /// its own output so cosine similarity math still behaves sensibly in tests.
    pub struct HashingEncoder {
        dim: usize,
    }

    impl HashingEncoder {
        pub fn new(dim: usize) -> Self {
            Self { dim }
        }
    }

    impl Encoder for HashingEncoder {
        fn name(&self) -> &str {
            "test-hashing-encoder"
        }

        fn dimension(&self) -> usize {
            self.dim
        }

        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EngineError> {
            Ok(texts.iter().map(|t| hash_embed(t, self.dim)).collect())
        }
    }

    pub fn hash_embed(text: &str, dim: usize) -> Vec<f32> {
        let mut v = vec![0f32; dim];
        for (i, token) in text.to_lowercase().split_whitespace().enumerate() {
            let mut h: u64 = 1469598103934665603;
            for b in token.bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(1099511628211);
            }
            let idx = (h as usize).wrapping_add(i) % dim;
            v[idx] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}
