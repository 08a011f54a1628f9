//! Offline feature-hashing embedder.
//!
//! Each lowercase alphanumeric token is hashed with SHA-256 into a signed
//! bucket; the vector is then L2-normalized. Texts sharing vocabulary land
//! close together, which is enough for local runs and tests without a model
//! server.

use async_trait::async_trait;
use bitrag_core::error::{BitRagError, Result};
use bitrag_core::traits::EmbeddingProvider;
use bitrag_core::types::EmbeddingVector;
use sha2::{Digest, Sha256};

/// Deterministic embedder with a fixed output dimension.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(BitRagError::Config("hash embedder dimension must be > 0".into()));
        }
        Ok(Self { dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_one(&self, text: &str) -> EmbeddingVector {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic() {
        let e = HashEmbeddingProvider::new(64).unwrap();
        let a = e.embed_query("Binary quantization rocks").await.unwrap();
        let b = e.embed_query("binary QUANTIZATION rocks!").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_unit_norm() {
        let e = HashEmbeddingProvider::new(128).unwrap();
        let v = e.embed_query("hello world").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let e = HashEmbeddingProvider::new(16).unwrap();
        let v = e.embed_query("  ... ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_one_vector_per_text() {
        let e = HashEmbeddingProvider::new(32).unwrap();
        let texts: Vec<String> = (0..5).map(|i| format!("text {i}")).collect();
        assert_eq!(e.embed(&texts).await.unwrap().len(), 5);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashEmbeddingProvider::new(0).is_err());
    }
}
