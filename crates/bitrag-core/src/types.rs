//! Document types passed into the knowledge engine.

use serde::{Deserialize, Serialize};

/// Dense embedding produced by an [`EmbeddingProvider`](crate::EmbeddingProvider).
pub type EmbeddingVector = Vec<f32>;

/// Filename used when the caller does not supply one.
pub const UNKNOWN_FILENAME: &str = "unknown";

/// Source attribution for an ingested chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub filename: String,
    /// 1-based page number, 0 when unknown.
    pub page: u32,
}

impl DocumentMeta {
    /// Build metadata, replacing a blank filename with `"unknown"`.
    pub fn new(filename: impl Into<String>, page: u32) -> Self {
        let filename = filename.into();
        let filename = if filename.trim().is_empty() {
            UNKNOWN_FILENAME.to_string()
        } else {
            filename.trim().to_string()
        };
        Self { filename, page }
    }

    /// Human-readable citation label: `file.pdf` or `file.pdf(page 3)`.
    pub fn citation_label(&self) -> String {
        if self.page > 0 {
            format!("{}(page {})", self.filename, self.page)
        } else {
            self.filename.clone()
        }
    }
}

impl Default for DocumentMeta {
    fn default() -> Self {
        Self {
            filename: UNKNOWN_FILENAME.to_string(),
            page: 0,
        }
    }
}

/// One chunk of extracted text plus its source, as handed over by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default)]
    pub page: u32,
}

fn default_filename() -> String {
    UNKNOWN_FILENAME.to_string()
}

impl DocumentChunk {
    pub fn new(text: impl Into<String>, filename: impl Into<String>, page: u32) -> Self {
        Self {
            text: text.into(),
            filename: filename.into(),
            page,
        }
    }

    /// Validated metadata for this chunk.
    pub fn meta(&self) -> DocumentMeta {
        DocumentMeta::new(self.filename.clone(), self.page)
    }
}
