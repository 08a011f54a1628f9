//! # BitRAG Core
//!
//! Shared building blocks for the BitRAG workspace: the error type,
//! configuration, document types and the provider traits that the
//! knowledge engine consumes.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::BitRagConfig;
pub use error::{BitRagError, ErrorKind, Result};
pub use traits::{AnswerGenerator, EmbeddingProvider};
pub use types::{DocumentChunk, DocumentMeta, EmbeddingVector};
