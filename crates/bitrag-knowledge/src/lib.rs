//! # BitRAG Knowledge
//!
//! Session-scoped retrieval over binary-quantized embeddings.
//! Each float vector is reduced to one sign bit per dimension (32× smaller)
//! and searched with an exact Hamming scan.
//!
//! ## Design
//! - **Embedder**: batched provider calls, dimension probed once
//! - **Quantize**: `v > 0` → 1, packed MSB-first
//! - **VectorStore**: per-session collections, in memory or SQLite
//! - **Retriever**: query → code → top-k by Hamming distance
//! - **ContextAssembler**: ranked texts + deduplicated citations
//!
//! ## How it works
//! ```text
//! ingest(session, chunks)
//!   ↓ Embedder (batches of 512)
//! f32 vectors → sign bits
//!   ↓ VectorStore::insert_batch (atomic per batch)
//! docs_<session>
//!
//! query(session, "what is the refund policy?")
//!   ↓ same Embedder + quantizer
//! Hamming top-k → "text\n\n---\n\ntext" + ["policy.pdf(page 3)"]
//! ```

pub mod context;
pub mod embedder;
pub mod quantize;
pub mod retriever;
pub mod service;
pub mod store;

pub use context::{AssembledContext, ContextAssembler, PromptTemplate};
pub use embedder::Embedder;
pub use quantize::BinaryCode;
pub use retriever::Retriever;
pub use service::{Answer, KnowledgeService, QueryOutcome, SessionInfo};
pub use store::{IngestReport, MemoryStore, RankedMatch, SqliteStore, VectorStore};
