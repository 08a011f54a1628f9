//! SQLite store: one database per collection, codes kept as BLOBs.
//!
//! With a data directory each collection lives in `{dir}/{name}.db` and is
//! reopened on the next `create_collection` without `drop_existing`. Without
//! one, every collection is an in-memory database.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use bitrag_core::error::{BitRagError, Result};
use rusqlite::{Connection, OptionalExtension, params};

use super::{
    ItemId, NewItem, RankedMatch, StoredItem, VectorStore, check_codes, check_query, top_k,
    validate_collection_name,
};
use crate::quantize::{BinaryCode, code_len, hamming_bytes};

/// Index layout recorded in `collection_meta`.
const INDEX_KIND: &str = "bin_flat_hamming";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS collection_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        text TEXT NOT NULL,
        filename TEXT NOT NULL,
        page INTEGER NOT NULL DEFAULT 0,
        code BLOB NOT NULL
    );";

fn storage(e: rusqlite::Error) -> BitRagError {
    BitRagError::Storage(e.to_string())
}

fn poisoned() -> BitRagError {
    BitRagError::Storage("sqlite store lock poisoned".into())
}

struct SqliteCollection {
    name: String,
    dimension: usize,
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
    /// Set under `conn` once the collection was dropped or replaced.
    retired: AtomicBool,
}

impl SqliteCollection {
    fn open(name: &str, path: Option<PathBuf>, dimension: usize) -> Result<Self> {
        let conn = match &path {
            Some(p) => Connection::open(p),
            None => Connection::open_in_memory(),
        }
        .map_err(storage)?;
        conn.execute_batch(SCHEMA).map_err(storage)?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM collection_meta WHERE key = 'dimension'",
                [],
                |r| r.get(0),
            )
            .optional()
            .map_err(storage)?;
        match stored {
            Some(value) => {
                let existing: usize = value
                    .parse()
                    .map_err(|_| BitRagError::Storage(format!("bad stored dimension '{value}'")))?;
                if existing != dimension {
                    return Err(BitRagError::DimensionMismatch {
                        expected: existing,
                        actual: dimension,
                    });
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO collection_meta (key, value) VALUES ('dimension', ?1), ('index', ?2)",
                    params![dimension.to_string(), INDEX_KIND],
                )
                .map_err(storage)?;
            }
        }

        Ok(Self {
            name: name.to_string(),
            dimension,
            path,
            conn: Mutex::new(conn),
            retired: AtomicBool::new(false),
        })
    }

    /// Refuse further inserts. Waits for an in-flight insert to commit.
    fn retire(&self) -> Result<()> {
        let _conn = self.conn.lock().map_err(|_| poisoned())?;
        self.retired.store(true, Ordering::Release);
        Ok(())
    }

    fn append(&self, items: Vec<NewItem>) -> Result<Vec<ItemId>> {
        check_codes(self.dimension, &items)?;

        let mut conn = self.conn.lock().map_err(|_| poisoned())?;
        if self.retired.load(Ordering::Acquire) {
            return Err(BitRagError::CollectionNotFound(self.name.clone()));
        }
        let tx = conn.transaction().map_err(storage)?;
        let mut ids = Vec::with_capacity(items.len());
        {
            let mut stmt = tx
                .prepare("INSERT INTO items (text, filename, page, code) VALUES (?1, ?2, ?3, ?4)")
                .map_err(storage)?;
            for item in &items {
                stmt.execute(params![
                    item.text,
                    item.meta.filename,
                    item.meta.page,
                    item.code.as_bytes()
                ])
                .map_err(storage)?;
                ids.push(tx.last_insert_rowid() as ItemId);
            }
        }
        // Dropping an uncommitted transaction rolls back the whole batch.
        tx.commit().map_err(storage)?;
        Ok(ids)
    }

    fn remove_file(&self) -> Result<()> {
        if let Some(path) = &self.path {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

/// Collections persisted through SQLite.
pub struct SqliteStore {
    data_dir: Option<PathBuf>,
    collections: RwLock<HashMap<String, Arc<SqliteCollection>>>,
}

impl SqliteStore {
    /// Store collections as files under `dir`, creating it if needed.
    pub fn open(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        tracing::info!("💾 SQLite store at {}", dir.display());
        Ok(Self {
            data_dir: Some(dir),
            collections: RwLock::new(HashMap::new()),
        })
    }

    /// Keep every collection in an in-memory database.
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn collection(&self, name: &str) -> Result<Arc<SqliteCollection>> {
        self.collections
            .read()
            .map_err(|_| poisoned())?
            .get(name)
            .cloned()
            .ok_or_else(|| BitRagError::CollectionNotFound(name.to_string()))
    }

    fn path_for(&self, name: &str) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(format!("{name}.db")))
    }
}

impl VectorStore for SqliteStore {
    fn backend(&self) -> &str {
        "sqlite"
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
        if let Some(old) = collections.remove(name) {
            old.retire()?;
            old.remove_file()?;
        }
        let path = self.path_for(name);
        if drop_existing {
            if let Some(p) = &path {
                if p.exists() {
                    std::fs::remove_file(p)?;
                }
            }
        }
        let collection = SqliteCollection::open(name, path, dimension)?;
        collections.insert(name.to_string(), Arc::new(collection));
        tracing::debug!("🗂️ Created sqlite collection '{}' (dim={})", name, dimension);
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
        let conn = collection.conn.lock().map_err(|_| poisoned())?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM items", [], |r| r.get(0))
            .map_err(storage)?;
        Ok(n as usize)
    }

    fn insert_batch(&self, name: &str, items: Vec<NewItem>) -> Result<Vec<ItemId>> {
        self.collection(name)?.append(items)
    }

    fn search(&self, name: &str, query: &BinaryCode, k: usize) -> Result<Vec<RankedMatch>> {
        let collection = self.collection(name)?;
        check_query(collection.dimension, query, k)?;
        let expected_len = code_len(collection.dimension);

        let conn = collection.conn.lock().map_err(|_| poisoned())?;
        let mut scored: Vec<(u32, i64)> = Vec::new();
        {
            let mut stmt = conn
                .prepare("SELECT id, code FROM items ORDER BY id")
                .map_err(storage)?;
            let mut rows = stmt.query([]).map_err(storage)?;
            while let Some(row) = rows.next().map_err(storage)? {
                let id: i64 = row.get(0).map_err(storage)?;
                let code: Vec<u8> = row.get(1).map_err(storage)?;
                if code.len() != expected_len {
                    return Err(BitRagError::Storage(format!(
                        "item {id} in '{name}' has a {}-byte code, expected {expected_len}",
                        code.len()
                    )));
                }
                scored.push((hamming_bytes(&code, query.as_bytes()), id));
            }
        }

        let mut stmt = conn
            .prepare("SELECT text, filename, page, code FROM items WHERE id = ?1")
            .map_err(storage)?;
        let mut matches = Vec::new();
        for (distance, id) in top_k(scored, k) {
            let (text, filename, page, code): (String, String, u32, Vec<u8>) = stmt
                .query_row(params![id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
                .map_err(storage)?;
            let item = StoredItem {
                id: id as ItemId,
                text,
                filename,
                page,
                code: BinaryCode::from_bytes(code, collection.dimension)?,
            };
            matches.push(RankedMatch::new(item, distance));
        }
        Ok(matches)
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        let removed = self
            .collections
            .write()
            .map_err(|_| poisoned())?
            .remove(name);
        if let Some(collection) = removed {
            collection.retire()?;
            collection.remove_file()?;
            tracing::debug!("🗑️ Dropped sqlite collection '{}'", name);
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
