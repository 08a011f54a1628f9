//! # BitRAG Providers
//!
//! Embedding and answer-generation providers.
//!
//! All remote providers (OpenAI, Mistral, Together, Groq, OpenRouter, Ollama,
//! llama.cpp) are handled by a single `OpenAiCompatibleProvider`. The
//! `HashEmbeddingProvider` embeds locally without any model.

pub mod hash;
pub mod openai_compatible;
pub mod provider_registry;

use std::sync::Arc;

use bitrag_core::config::{EmbeddingConfig, GenerationConfig};
use bitrag_core::error::{BitRagError, Result};
use bitrag_core::traits::{AnswerGenerator, EmbeddingProvider};

pub use hash::HashEmbeddingProvider;
pub use openai_compatible::OpenAiCompatibleProvider;

/// Create an embedding provider from the `[embedding]` section.
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbeddingProvider::new(config.dimension)?)),

        // Custom endpoint: "custom:https://my-server.com/v1"
        other if other.starts_with("custom:") => Ok(Arc::new(
            OpenAiCompatibleProvider::for_embeddings(None, config)?,
        )),

        name => {
            let registry = provider_registry::get_provider_config(name)
                .ok_or_else(|| BitRagError::ProviderNotFound(name.into()))?;
            Ok(Arc::new(OpenAiCompatibleProvider::for_embeddings(Some(registry), config)?))
        }
    }
}

/// Create an answer generator from the `[generation]` section.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn AnswerGenerator>> {
    match config.provider.as_str() {
        other if other.starts_with("custom:") => Ok(Arc::new(
            OpenAiCompatibleProvider::for_generation(None, config)?,
        )),
        name => {
            let registry = provider_registry::get_provider_config(name)
                .ok_or_else(|| BitRagError::ProviderNotFound(name.into()))?;
            Ok(Arc::new(OpenAiCompatibleProvider::for_generation(Some(registry), config)?))
        }
    }
}

/// List all available embedding provider names.
pub fn available_providers() -> Vec<&'static str> {
    let mut names = provider_registry::all_provider_names();
    names.push("hash");
    names.push("custom");
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds_hash_provider() {
        let provider = create_embedding_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.name(), "hash");
    }

    #[test]
    fn test_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "does-not-exist".into(),
            ..EmbeddingConfig::default()
        };
        let err = create_embedding_provider(&config).err().unwrap();
        assert!(matches!(err, BitRagError::ProviderNotFound(_)));
    }

    #[test]
    fn test_custom_generator() {
        let config = GenerationConfig {
            provider: "custom:http://localhost:8000/v1".into(),
            ..GenerationConfig::default()
        };
        let generator = create_generator(&config).unwrap();
        assert_eq!(generator.name(), "custom");
    }

    #[test]
    fn test_available_providers_includes_local() {
        let names = available_providers();
        assert!(names.contains(&"hash"));
        assert!(names.contains(&"ollama"));
    }
}
