//! BitRAG configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BitRagError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BitRagConfig {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl BitRagConfig {
    /// Load config from the default path (~/.bitrag/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BitRagError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BitRagError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| BitRagError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings that would make ingestion or search meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.provider.trim().is_empty() {
            return Err(BitRagError::Config("embedding.provider must be set".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(BitRagError::Config("embedding.batch_size must be > 0".into()));
        }
        if self.embedding.timeout_secs == 0 {
            return Err(BitRagError::Config("embedding.timeout_secs must be > 0".into()));
        }
        if self.embedding.provider == "hash" && self.embedding.dimension == 0 {
            return Err(BitRagError::Config(
                "embedding.dimension must be > 0 for the hash provider".into(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(BitRagError::Config("retrieval.top_k must be > 0".into()));
        }
        if self.generation.timeout_secs == 0 {
            return Err(BitRagError::Config("generation.timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the BitRAG home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".bitrag")
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "hash", a registry name ("openai", "ollama", ...) or "custom:<url>".
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Overrides the registry base URL when non-empty.
    #[serde(default)]
    pub endpoint: String,
    /// Overrides the registry env vars when non-empty.
    #[serde(default)]
    pub api_key: String,
    /// Output dimension of the hash provider. Remote providers report their own.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_provider() -> String { "hash".into() }
fn default_embedding_model() -> String { "text-embedding-3-small".into() }
fn default_dimension() -> usize { 1024 }
fn default_batch_size() -> usize { 512 }
fn default_embedding_timeout() -> u64 { 60 }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            endpoint: String::new(),
            api_key: String::new(),
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

/// Which vector store backend holds session collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Vector store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory for SQLite collection files. Empty keeps them in memory.
    #[serde(default)]
    pub data_dir: String,
}

/// When to append the citation line to a generated answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationPolicy {
    /// Skip only if the exact rendered citation line is already present.
    #[default]
    Exact,
    /// Skip if the answer contains the literal marker "Citation:".
    Marker,
    /// Always append.
    Always,
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub citation_policy: CitationPolicy,
}

fn default_top_k() -> usize { 5 }

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            citation_policy: CitationPolicy::default(),
        }
    }
}

/// Answer generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

fn default_generation_provider() -> String { "groq".into() }
fn default_generation_model() -> String { "moonshotai/kimi-k2-instruct".into() }
fn default_temperature() -> f32 { 0.4 }
fn default_max_tokens() -> u32 { 1000 }
fn default_generation_timeout() -> u64 { 120 }

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            endpoint: String::new(),
            api_key: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BitRagConfig::default();
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.embedding.batch_size, 512);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.retrieval.citation_policy, CitationPolicy::Exact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = BitRagConfig::parse(
            r#"
            [embedding]
            provider = "openai"
            batch_size = 64

            [store]
            backend = "sqlite"
            data_dir = "/tmp/bitrag"

            [retrieval]
            citation_policy = "marker"
            "#,
        )
        .unwrap();
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.embedding.timeout_secs, 60);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.retrieval.citation_policy, CitationPolicy::Marker);
        assert_eq!(config.generation.max_tokens, 1000);
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let err = BitRagConfig::parse("[embedding]\nbatch_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        assert!(BitRagConfig::parse("[retrieval]\ntop_k = 0\n").is_err());
    }

    #[test]
    fn test_rejects_invalid_toml() {
        let err = BitRagConfig::parse("[embedding\nprovider=").unwrap_err();
        assert!(matches!(err, BitRagError::Config(_)));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("bitrag-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let mut config = BitRagConfig::default();
        config.retrieval.top_k = 9;
        config.save_to(&path).unwrap();

        let loaded = BitRagConfig::load_from(&path).unwrap();
        assert_eq!(loaded.retrieval.top_k, 9);
        std::fs::remove_dir_all(&dir).ok();
    }
}
