//! Embedding encoder capability and a deterministic mock

use anyhow::Result;
use async_trait::async_trait;

/// Text-to-vector encoder.
///
/// Encoding must be a pure function of the input text: the same text always
/// yields the same vector for a given encoder. The corpus declares its own
/// dimension; when an encoder's native dimension differs, the vector index
/// applies the declared pad/truncate dimension-fix.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Encode a batch of texts, one vector per input, in order.
    ///
    /// # Errors
    ///
    /// Returns an error when the encoder backend fails; treated as transient
    /// by ingest (retried) and as a failed strategy by query time.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Native output dimension of this encoder
    fn dimension(&self) -> usize;

    /// Model name for index metadata
    fn model_name(&self) -> &str;
}

/// Deterministic mock encoder for tests and offline development.
///
/// Produces hash-seeded unit vectors: not semantic, but stable across runs,
/// which is what the determinism and dimension-fix scenarios need. Texts
/// sharing many tokens land measurably closer than unrelated texts because
/// each token contributes its own seeded component.
pub struct MockEncoder {
    name: String,
    dimension: usize,
}

impl MockEncoder {
    /// Create a mock encoder with the given output dimension
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            name: format!("mock-{dimension}"),
            dimension,
        }
    }

    fn encode_one(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vector = vec![0.0f32; self.dimension];
        for token in crate::text::tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.stem.hash(&mut hasher);
            let mut seed = hasher.finish();
            for slot in &mut vector {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                *slot += ((seed >> 16) as f32) / 32768.0 - 1.0;
            }
        }
        normalize(vector)
    }
}

#[async_trait]
impl Encoder for MockEncoder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.encode_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Scale a vector to unit length; zero vectors are returned unchanged.
#[must_use]
fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_across_calls() {
        let encoder = MockEncoder::new(64);
        let a = encoder.encode(&["budget meeting".to_string()]).await.unwrap();
        let b = encoder.encode(&["budget meeting".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn output_has_declared_dimension_and_unit_norm() {
        let encoder = MockEncoder::new(128);
        let vectors = encoder.encode(&["hello world".to_string()]).await.unwrap();
        assert_eq!(vectors[0].len(), 128);
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_tokens_pull_vectors_together() {
        let encoder = MockEncoder::new(128);
        let vectors = encoder
            .encode(&[
                "the budget meeting notes".to_string(),
                "budget meeting summary".to_string(),
                "completely unrelated picnic".to_string(),
            ])
            .await
            .unwrap();
        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(dot(&vectors[0], &vectors[1]) > dot(&vectors[0], &vectors[2]));
    }
}
