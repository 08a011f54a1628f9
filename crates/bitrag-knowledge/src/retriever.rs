//! Retriever — query text in, ranked matches out.

use std::sync::Arc;

use bitrag_core::error::{BitRagError, Result};

use crate::embedder::Embedder;
use crate::store::{RankedMatch, VectorStore};

/// Binds an embedder to one collection of a store.
///
/// Query codes and stored codes both come from the same [`Embedder`], so they
/// share dimension and bit layout.
pub struct Retriever {
    embedder: Arc<Embedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<Embedder>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        top_k: usize,
    ) -> Result<Self> {
        if top_k == 0 {
            return Err(BitRagError::InvalidInput("top_k must be > 0".into()));
        }
        let collection = collection.into();
        if store.has_collection(&collection) {
            let dimension = store.dimension(&collection)?;
            if dimension != embedder.dimension() {
                return Err(BitRagError::DimensionMismatch {
                    expected: dimension,
                    actual: embedder.dimension(),
                });
            }
        }
        Ok(Self {
            embedder,
            store,
            collection,
            top_k,
        })
    }

    /// Top matches for `query`; `k` overrides the default when given.
    pub async fn search(&self, query: &str, k: Option<usize>) -> Result<Vec<RankedMatch>> {
        let k = k.unwrap_or(self.top_k);
        if k == 0 {
            return Err(BitRagError::InvalidInput("k must be > 0".into()));
        }
        let code = self.embedder.encode_query(query).await?;
        let dimension = self.store.dimension(&self.collection)?;
        if code.bits() != dimension {
            return Err(BitRagError::DimensionMismatch {
                expected: dimension,
                actual: code.bits(),
            });
        }
        let matches = self.store.search(&self.collection, &code, k)?;
        tracing::debug!(
            "🔍 '{}' → {} match(es) from {}",
            self.collection,
            matches.len(),
            self.store.backend()
        );
        Ok(matches)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn embedder(&self) -> &Arc<Embedder> {
        &self.embedder
    }
}
