//! Embedding provider trait.

use async_trait::async_trait;

use crate::error::{BitRagError, Result};
use crate::types::EmbeddingVector;

/// Maps text to dense vectors.
///
/// Implementations must return exactly one vector per input text, in input
/// order. Batching and timeouts are handled by the caller.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Embed a batch of document texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;

    /// Embed a search query. Defaults to the document embedding.
    async fn embed_query(&self, text: &str) -> Result<EmbeddingVector> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BitRagError::Upstream(format!("{} returned no embedding", self.name())))
    }
}
