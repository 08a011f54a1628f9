//! Vector storage — per-session collections of binary codes.
//!
//! A collection is bound to one code dimension for its whole life and only
//! grows by whole batches. Search is an exact Hamming scan (the equivalent of
//! a flat binary index), ordered by ascending distance with ties resolved by
//! insertion order.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::path::PathBuf;
use std::sync::Arc;

use bitrag_core::config::{StoreBackend, StoreConfig};
use bitrag_core::error::{BitRagError, Result};
use bitrag_core::types::DocumentMeta;
use serde::Serialize;

use crate::quantize::BinaryCode;

/// Caller-opaque item identifier, monotonic within a collection.
pub type ItemId = u64;

/// Longest accepted collection name.
const MAX_COLLECTION_NAME: usize = 128;

/// An item as stored in a collection. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredItem {
    pub id: ItemId,
    pub text: String,
    pub filename: String,
    pub page: u32,
    #[serde(skip)]
    pub code: BinaryCode,
}

impl StoredItem {
    pub fn meta(&self) -> DocumentMeta {
        DocumentMeta {
            filename: self.filename.clone(),
            page: self.page,
        }
    }

    pub fn citation_label(&self) -> String {
        self.meta().citation_label()
    }
}

/// An item waiting to be inserted; the store assigns its id.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub text: String,
    pub meta: DocumentMeta,
    pub code: BinaryCode,
}

impl NewItem {
    pub fn new(text: impl Into<String>, meta: DocumentMeta, code: BinaryCode) -> Self {
        Self {
            text: text.into(),
            meta,
            code,
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, Serialize)]
pub struct RankedMatch {
    pub item: StoredItem,
    /// Hamming distance to the query code.
    pub distance: u32,
    /// `1 / (1 + distance)`, in (0, 1].
    pub score: f32,
}

impl RankedMatch {
    pub fn new(item: StoredItem, distance: u32) -> Self {
        Self {
            item,
            distance,
            score: score(distance),
        }
    }
}

/// Similarity derived from Hamming distance.
pub fn score(distance: u32) -> f32 {
    1.0 / (1.0 + distance as f32)
}

/// Outcome of a successful multi-batch ingest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub batches: usize,
    pub items: usize,
    pub ids: Vec<ItemId>,
}

impl IngestReport {
    /// Record one committed batch.
    pub fn commit(&mut self, ids: Vec<ItemId>) {
        self.batches += 1;
        self.items += ids.len();
        self.ids.extend(ids);
    }

    /// Turn a batch failure into the caller-facing error.
    ///
    /// With nothing committed the original error is returned untouched;
    /// otherwise the committed prefix is reported.
    pub fn abort(&self, err: BitRagError) -> BitRagError {
        if self.batches == 0 {
            return err;
        }
        BitRagError::IngestAborted {
            committed_batches: self.batches,
            committed_items: self.items,
            reason: err.to_string(),
        }
    }
}

/// Storage backend for session collections.
///
/// All methods are synchronous; implementations must make each
/// `insert_batch` visible to `search` atomically and serialize writers per
/// collection.
pub trait VectorStore: Send + Sync {
    /// Backend name for logging.
    fn backend(&self) -> &str;

    /// Create `name` bound to `dimension` bits.
    ///
    /// With `drop_existing` an existing collection is replaced by an empty
    /// one; without it an existing collection is left untouched.
    fn create_collection(&self, name: &str, dimension: usize, drop_existing: bool) -> Result<()>;

    fn has_collection(&self, name: &str) -> bool;

    /// Code dimension of `name`.
    fn dimension(&self, name: &str) -> Result<usize>;

    /// Number of items in `name`.
    fn count(&self, name: &str) -> Result<usize>;

    /// Insert one batch atomically, returning the assigned ids in order.
    fn insert_batch(&self, name: &str, items: Vec<NewItem>) -> Result<Vec<ItemId>>;

    /// Exact top-`k` Hamming search.
    fn search(&self, name: &str, query: &BinaryCode, k: usize) -> Result<Vec<RankedMatch>>;

    /// Release all storage for `name`. Absent collections are ignored.
    fn drop_collection(&self, name: &str) -> Result<()>;

    /// Names of all live collections.
    fn collections(&self) -> Vec<String>;

    /// Append `items` in batches of `batch_size`.
    ///
    /// Every code is checked against the collection dimension before the
    /// first write. A failing batch leaves earlier batches committed and is
    /// reported through [`IngestReport::abort`].
    fn ingest(&self, name: &str, items: Vec<NewItem>, batch_size: usize) -> Result<IngestReport> {
        if items.is_empty() {
            return Err(BitRagError::EmptyInput("no items to ingest".into()));
        }
        if batch_size == 0 {
            return Err(BitRagError::InvalidInput("batch size must be > 0".into()));
        }
        let dimension = self.dimension(name)?;
        check_codes(dimension, &items)?;

        let mut report = IngestReport::default();
        let mut remaining = items;
        while !remaining.is_empty() {
            let rest = remaining.split_off(batch_size.min(remaining.len()));
            match self.insert_batch(name, remaining) {
                Ok(ids) => report.commit(ids),
                Err(e) => return Err(report.abort(e)),
            }
            remaining = rest;
        }
        tracing::info!(
            "📥 Ingested {} items into '{}' in {} batch(es)",
            report.items,
            name,
            report.batches
        );
        Ok(report)
    }
}

/// Build the store selected by `[store]`.
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Sqlite => {
            if config.data_dir.trim().is_empty() {
                Ok(Arc::new(SqliteStore::in_memory()))
            } else {
                Ok(Arc::new(SqliteStore::open(PathBuf::from(&config.data_dir))?))
            }
        }
    }
}

/// Reject names that cannot double as a file name.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_COLLECTION_NAME
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(BitRagError::InvalidInput(format!(
            "invalid collection name '{name}'"
        )));
    }
    Ok(())
}

pub(crate) fn check_codes(dimension: usize, items: &[NewItem]) -> Result<()> {
    match items.iter().find(|item| item.code.bits() != dimension) {
        Some(bad) => Err(BitRagError::DimensionMismatch {
            expected: dimension,
            actual: bad.code.bits(),
        }),
        None => Ok(()),
    }
}

pub(crate) fn check_query(dimension: usize, query: &BinaryCode, k: usize) -> Result<()> {
    if k == 0 {
        return Err(BitRagError::InvalidInput("k must be > 0".into()));
    }
    if query.bits() != dimension {
        return Err(BitRagError::DimensionMismatch {
            expected: dimension,
            actual: query.bits(),
        });
    }
    Ok(())
}

/// Keep the `k` smallest `(distance, position)` pairs, sorted.
///
/// `position` is insertion order, so equal distances keep their insertion
/// order.
pub(crate) fn top_k<P: Ord + Copy>(mut scored: Vec<(u32, P)>, k: usize) -> Vec<(u32, P)> {
    if scored.len() > k {
        scored.select_nth_unstable(k - 1);
        scored.truncate(k);
    }
    scored.sort_unstable();
    scored
}
