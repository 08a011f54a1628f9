//! In-process store: one append-only vector of items per collection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use bitrag_core::error::{BitRagError, Result};

use super::{
    ItemId, NewItem, RankedMatch, StoredItem, VectorStore, check_codes, check_query, top_k,
    validate_collection_name,
};
use crate::quantize::{BinaryCode, hamming_bytes};

struct MemoryCollection {
    name: String,
    dimension: usize,
    /// Held for the whole of an insert; guards the next id.
    /// `None` once the collection was dropped or replaced.
    writer: Mutex<Option<ItemId>>,
    items: RwLock<Vec<Arc<StoredItem>>>,
}

impl MemoryCollection {
    fn new(name: &str, dimension: usize) -> Self {
        Self {
            name: name.to_string(),
            dimension,
            writer: Mutex::new(Some(1)),
            items: RwLock::new(Vec::new()),
        }
    }

    /// Refuse further inserts. Waits for an in-flight insert to finish.
    fn retire(&self) -> Result<()> {
        *self.writer.lock().map_err(|_| poisoned())? = None;
        Ok(())
    }

    fn append(&self, items: Vec<NewItem>) -> Result<Vec<ItemId>> {
        check_codes(self.dimension, &items)?;

        let mut writer = self.writer.lock().map_err(|_| poisoned())?;
        let start = (*writer).ok_or_else(|| BitRagError::CollectionNotFound(self.name.clone()))?;
        let stored: Vec<Arc<StoredItem>> = items
            .into_iter()
            .zip(start..)
            .map(|(item, id)| {
                Arc::new(StoredItem {
                    id,
                    text: item.text,
                    filename: item.meta.filename,
                    page: item.meta.page,
                    code: item.code,
                })
            })
            .collect();
        let ids: Vec<ItemId> = stored.iter().map(|s| s.id).collect();

        // Single extend under the write lock: readers see all or none.
        self.items.write().map_err(|_| poisoned())?.extend(stored);
        *writer = Some(start + ids.len() as ItemId);
        Ok(ids)
    }
}

/// Collections held in memory for the lifetime of the process.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, name: &str) -> Result<Arc<MemoryCollection>> {
        self.collections
            .read()
            .map_err(|_| poisoned())?
            .get(name)
            .cloned()
            .ok_or_else(|| BitRagError::CollectionNotFound(name.to_string()))
    }
}

fn poisoned() -> BitRagError {
    BitRagError::Storage("memory store lock poisoned".into())
}

impl VectorStore for MemoryStore {
    fn backend(&self) -> &str {
        "memory"
    }

    fn create_collection(&self, name: &str, dimension: usize, drop_existing: bool) -> Result<()> {
        validate_collection_name(name)?;
        if dimension == 0 {
            return Err(BitRagError::Config(format!(
                "collection '{name}' needs a dimension > 0"
            )));
        }
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        if collections.contains_key(name) && !drop_existing {
            return Ok(());
        }
        if let Some(old) = collections.get(name) {
            old.retire()?;
        }
        collections.insert(name.to_string(), Arc::new(MemoryCollection::new(name, dimension)));
        tracing::debug!("🗂️ Created memory collection '{}' (dim={})", name, dimension);
        Ok(())
    }

    fn has_collection(&self, name: &str) -> bool {
        self.collections
            .read()
            .map(|c| c.contains_key(name))
            .unwrap_or(false)
    }

    fn dimension(&self, name: &str) -> Result<usize> {
        Ok(self.collection(name)?.dimension)
    }

    fn count(&self, name: &str) -> Result<usize> {
        let collection = self.collection(name)?;
        let items = collection.items.read().map_err(|_| poisoned())?;
        Ok(items.len())
    }

    fn insert_batch(&self, name: &str, items: Vec<NewItem>) -> Result<Vec<ItemId>> {
        self.collection(name)?.append(items)
    }

    fn search(&self, name: &str, query: &BinaryCode, k: usize) -> Result<Vec<RankedMatch>> {
        let collection = self.collection(name)?;
        check_query(collection.dimension, query, k)?;

        // Snapshot so scoring runs without blocking writers.
        let snapshot: Vec<Arc<StoredItem>> =
            collection.items.read().map_err(|_| poisoned())?.clone();
        let scored: Vec<(u32, usize)> = snapshot
            .iter()
            .enumerate()
            .map(|(pos, item)| (hamming_bytes(item.code.as_bytes(), query.as_bytes()), pos))
            .collect();

        Ok(top_k(scored, k)
            .into_iter()
            .map(|(distance, pos)| RankedMatch::new(snapshot[pos].as_ref().clone(), distance))
            .collect())
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        let removed = self
            .collections
            .write()
            .map_err(|_| poisoned())?
            .remove(name);
        if let Some(collection) = removed {
            collection.retire()?;
            tracing::debug!("🗑️ Dropped memory collection '{}'", name);
        }
        Ok(())
    }

    fn collections(&self) -> Vec<String> {
        self.collections
            .read()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }
}
