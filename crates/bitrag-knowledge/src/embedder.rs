//! Embedder — batched embedding with a fixed, probed dimension.
//!
//! Wraps an [`EmbeddingProvider`] and guarantees:
//! - output vector `i` belongs to input text `i` for every batch size
//! - every vector has the dimension discovered by the construction probe
//! - each provider call is bounded by a timeout; expiry fails the whole call

use std::sync::Arc;
use std::time::Duration;

use bitrag_core::config::EmbeddingConfig;
use bitrag_core::error::{BitRagError, Result};
use bitrag_core::traits::EmbeddingProvider;
use bitrag_core::types::EmbeddingVector;

use crate::quantize::{self, BinaryCode};

/// Text embedded once at construction to learn the output dimension.
const PROBE_TEXT: &str = "test";

pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    dimension: usize,
    timeout: Duration,
}

impl Embedder {
    /// Probe the provider for its dimension and build an embedder.
    pub async fn connect(
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(BitRagError::Config("embedding batch size must be > 0".into()));
        }
        let probe = call_with_timeout(timeout, provider.embed(&[PROBE_TEXT.to_string()])).await?;
        let dimension = probe.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            return Err(BitRagError::Config(format!(
                "embedding provider '{}' returned an empty probe vector",
                provider.name()
            )));
        }
        tracing::info!(
            "🧭 Embedder ready: provider={} dim={} batch_size={}",
            provider.name(),
            dimension,
            batch_size
        );
        Ok(Self {
            provider,
            batch_size,
            dimension,
            timeout,
        })
    }

    /// Build from an `[embedding]` config section.
    pub async fn from_config(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Result<Self> {
        Self::connect(provider, config.batch_size, Duration::from_secs(config.timeout_secs)).await
    }

    /// Same provider and dimension, different batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(BitRagError::Config("embedding batch size must be > 0".into()));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Embed texts in batches of `batch_size`.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = call_with_timeout(self.timeout, self.provider.embed(batch)).await?;
            if embedded.len() != batch.len() {
                return Err(BitRagError::Upstream(format!(
                    "{} returned {} embeddings for {} texts",
                    self.provider.name(),
                    embedded.len(),
                    batch.len()
                )));
            }
            for vector in &embedded {
                self.check_dimension(vector)?;
            }
            tracing::debug!("🔢 Embedded batch of {} texts", batch.len());
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    /// Embed a search query.
    pub async fn embed_query(&self, text: &str) -> Result<EmbeddingVector> {
        let vector = call_with_timeout(self.timeout, self.provider.embed_query(text)).await?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    /// Sign-bit quantization shared by ingestion and search.
    pub fn quantize(&self, vectors: &[EmbeddingVector]) -> Vec<BinaryCode> {
        quantize::quantize(vectors)
    }

    /// Embed then quantize.
    pub async fn encode_batch(&self, texts: &[String]) -> Result<Vec<BinaryCode>> {
        let vectors = self.embed_batch(texts).await?;
        Ok(self.quantize(&vectors))
    }

    /// Embed then quantize a query.
    pub async fn encode_query(&self, text: &str) -> Result<BinaryCode> {
        let vector = self.embed_query(text).await?;
        Ok(quantize::quantize_vector(&vector))
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(BitRagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

async fn call_with_timeout<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("⏱️ Embedding call exceeded {:?}", timeout);
            Err(BitRagError::Timeout(timeout.as_secs()))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic fake: value `j` of text `t` is `sin(hash(t) + j)`.
    pub(crate) struct FakeProvider {
        pub dimension: usize,
        pub calls: AtomicUsize,
        /// Fail every call after this many successful ones.
        pub fail_after: Option<usize>,
        pub delay: Option<Duration>,
    }

    impl FakeProvider {
        pub fn new(dimension: usize) -> Self {
            Self {
                dimension,
                calls: AtomicUsize::new(0),
                fail_after: None,
                delay: None,
            }
        }

        pub fn vector_for(&self, text: &str) -> Vec<f32> {
            let seed = text.bytes().fold(17u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32));
            (0..self.dimension)
                .map(|j| ((seed % 1000) as f32 + j as f32 * 1.7).sin())
                .collect()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_after.is_some_and(|n| call >= n) {
                return Err(BitRagError::Upstream("fake provider down".into()));
            }
            Ok(texts.iter().map(|t| self.vector_for(t)).collect())
        }
    }

    /// Returns vectors one element short after the probe.
    struct ShrinkingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for ShrinkingProvider {
        fn name(&self) -> &str {
            "shrinking"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
            let dim = if self.calls.fetch_add(1, Ordering::SeqCst) == 0 { 8 } else { 7 };
            Ok(texts.iter().map(|_| vec![1.0; dim]).collect())
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("chunk number {i}")).collect()
    }

    #[tokio::test]
    async fn test_probe_discovers_dimension() {
        let embedder = Embedder::connect(Arc::new(FakeProvider::new(24)), 512, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(embedder.dimension(), 24);
    }

    #[tokio::test]
    async fn test_empty_probe_is_config_error() {
        let err = Embedder::connect(Arc::new(FakeProvider::new(0)), 512, Duration::from_secs(5))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BitRagError::Config(_)));
    }

    #[tokio::test]
    async fn test_batch_partitioning_invariance() {
        let input = texts(1100);
        let provider = Arc::new(FakeProvider::new(16));
        let mut outputs = Vec::new();
        for batch_size in [1, 512, input.len()] {
            let embedder = Embedder::connect(provider.clone(), batch_size, Duration::from_secs(5))
                .await
                .unwrap();
            outputs.push(embedder.embed_batch(&input).await.unwrap());
        }
        assert_eq!(outputs[0].len(), 1100);
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[1], outputs[2]);
    }

    #[tokio::test]
    async fn test_batches_bound_provider_calls() {
        let provider = Arc::new(FakeProvider::new(8));
        let embedder = Embedder::connect(provider.clone(), 512, Duration::from_secs(5))
            .await
            .unwrap();
        let before = provider.calls.load(Ordering::SeqCst);
        embedder.embed_batch(&texts(1000)).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst) - before, 2);
    }

    #[tokio::test]
    async fn test_failure_aborts_whole_call() {
        let provider = FakeProvider {
            fail_after: Some(2),
            ..FakeProvider::new(8)
        };
        let embedder = Embedder::connect(Arc::new(provider), 10, Duration::from_secs(5))
            .await
            .unwrap();
        // probe + first batch succeed, second batch fails
        let err = embedder.embed_batch(&texts(25)).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_upstream_failure() {
        let provider = Arc::new(FakeProvider::new(8));
        let embedder = Embedder::connect(provider, 10, Duration::from_millis(50)).await.unwrap();
        let slow = FakeProvider {
            delay: Some(Duration::from_millis(500)),
            ..FakeProvider::new(8)
        };
        let embedder = Embedder {
            provider: Arc::new(slow),
            ..embedder
        };
        let err = embedder.embed_batch(&texts(3)).await.unwrap_err();
        assert!(matches!(err, BitRagError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_dimension_drift_is_rejected() {
        let provider = Arc::new(ShrinkingProvider { calls: AtomicUsize::new(0) });
        let embedder = Embedder::connect(provider, 10, Duration::from_secs(5)).await.unwrap();
        let err = embedder.embed_batch(&texts(2)).await.unwrap_err();
        assert!(matches!(err, BitRagError::DimensionMismatch { expected: 8, actual: 7 }));
    }

    #[tokio::test]
    async fn test_query_and_document_codes_agree() {
        let embedder = Embedder::connect(Arc::new(FakeProvider::new(40)), 4, Duration::from_secs(5))
            .await
            .unwrap();
        let doc = embedder.encode_batch(&["same words".to_string()]).await.unwrap();
        let query = embedder.encode_query("same words").await.unwrap();
        assert_eq!(doc[0], query);
        assert_eq!(query.bits(), 40);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let result = Embedder::connect(Arc::new(FakeProvider::new(8)), 0, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
