//! Unified OpenAI-compatible provider.
//!
//! A single struct that handles both embeddings and chat completions for every
//! OpenAI-compatible API. Providers differ only by endpoint URL, auth style,
//! model and API key.

use async_trait::async_trait;
use bitrag_core::config::{EmbeddingConfig, GenerationConfig};
use bitrag_core::error::{BitRagError, Result};
use bitrag_core::traits::{AnswerGenerator, EmbeddingProvider};
use bitrag_core::types::EmbeddingVector;
use serde_json::{Value, json};
use std::time::Duration;

use crate::provider_registry::{AuthStyle, ProviderConfig};

/// A unified provider that works with any OpenAI-compatible API.
pub struct OpenAiCompatibleProvider {
    /// Provider name (e.g., "openai", "groq", "ollama").
    name: String,
    /// API key for authentication.
    api_key: String,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    base_url: String,
    chat_path: String,
    /// `None` when the provider cannot embed.
    embeddings_path: Option<String>,
    auth_style: AuthStyle,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Create from a known provider config.
    ///
    /// Resolution order:
    /// - API key: `api_key` argument > registry env vars > empty
    /// - Base URL: `endpoint` argument > env override > registry default
    pub fn from_registry(
        registry: &ProviderConfig,
        endpoint: &str,
        api_key: &str,
        model: &str,
    ) -> Result<Self> {
        let api_key = if !api_key.is_empty() {
            api_key.to_string()
        } else {
            registry
                .env_keys
                .iter()
                .find_map(|key| std::env::var(key).ok())
                .unwrap_or_default()
        };

        let base_url = if !endpoint.is_empty() {
            endpoint.trim_end_matches('/').to_string()
        } else {
            registry
                .base_url_env
                .and_then(|env_key| {
                    let val = std::env::var(env_key).ok()?;
                    // OLLAMA_HOST / LLAMACPP_HOST usually omit the /v1 suffix
                    if val.ends_with("/v1") {
                        Some(val)
                    } else {
                        Some(format!("{}/v1", val.trim_end_matches('/')))
                    }
                })
                .unwrap_or_else(|| registry.base_url.to_string())
        };

        Ok(Self {
            name: registry.name.to_string(),
            api_key,
            base_url,
            chat_path: registry.chat_path.to_string(),
            embeddings_path: registry.embeddings_path.map(String::from),
            auth_style: registry.auth_style,
            model: model.to_string(),
            temperature: 0.4,
            max_tokens: 1000,
            timeout_secs: 60,
            client: build_client(60)?,
        })
    }

    /// Create for a custom endpoint (e.g., "custom:https://my-server.com/v1").
    pub fn custom(endpoint: &str, api_key: &str, model: &str) -> Result<Self> {
        let base_url = endpoint
            .strip_prefix("custom:")
            .unwrap_or(endpoint)
            .trim_end_matches('/')
            .to_string();
        if base_url.is_empty() {
            return Err(BitRagError::Config("custom provider needs a URL".into()));
        }

        let api_key = if !api_key.is_empty() {
            api_key.to_string()
        } else {
            std::env::var("CUSTOM_API_KEY").unwrap_or_default()
        };

        let auth_style = if api_key.is_empty() {
            AuthStyle::None
        } else {
            AuthStyle::Bearer
        };

        Ok(Self {
            name: "custom".to_string(),
            api_key,
            base_url,
            chat_path: "/chat/completions".to_string(),
            embeddings_path: Some("/embeddings".to_string()),
            auth_style,
            model: model.to_string(),
            temperature: 0.4,
            max_tokens: 1000,
            timeout_secs: 60,
            client: build_client(60)?,
        })
    }

    /// Embedding provider described by an `[embedding]` config section.
    pub fn for_embeddings(registry: Option<&ProviderConfig>, config: &EmbeddingConfig) -> Result<Self> {
        let model = match registry.and_then(|r| r.default_embedding_model) {
            Some(default) if config.model.is_empty() => default,
            _ => config.model.as_str(),
        };
        let provider = match registry {
            Some(r) => Self::from_registry(r, &config.endpoint, &config.api_key, model)?,
            None => Self::custom(&config.provider, &config.api_key, model)?,
        };
        if provider.embeddings_path.is_none() {
            return Err(BitRagError::Config(format!(
                "provider '{}' has no embeddings endpoint",
                provider.name
            )));
        }
        provider.with_timeout(config.timeout_secs)
    }

    /// Answer generator described by a `[generation]` config section.
    pub fn for_generation(registry: Option<&ProviderConfig>, config: &GenerationConfig) -> Result<Self> {
        let provider = match registry {
            Some(r) => Self::from_registry(r, &config.endpoint, &config.api_key, &config.model)?,
            None => Self::custom(&config.provider, &config.api_key, &config.model)?,
        };
        provider
            .with_sampling(config.temperature, config.max_tokens)
            .with_timeout(config.timeout_secs)
    }

    /// Set the request timeout in seconds.
    pub fn with_timeout(mut self, secs: u64) -> Result<Self> {
        self.client = build_client(secs)?;
        self.timeout_secs = secs;
        Ok(self)
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the auth header for the request.
    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_style {
            AuthStyle::Bearer if !self.api_key.is_empty() => {
                req.header("Authorization", format!("Bearer {}", self.api_key))
            }
            _ => req,
        }
    }

    fn check_auth(&self) -> Result<()> {
        if self.auth_style != AuthStyle::None && self.api_key.is_empty() {
            return Err(BitRagError::ApiKeyMissing(self.name.clone()));
        }
        Ok(())
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body);
        let req = self.apply_auth(req);
        tracing::debug!("📡 {} POST {}", self.name, path);

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                BitRagError::Timeout(self.timeout_secs)
            } else {
                BitRagError::Http(format!("{} connection failed ({}): {}", self.name, url, e))
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!("⚠️ {} returned {}", self.name, status);
            return Err(BitRagError::Upstream(format!(
                "{} API error {}: {}",
                self.name, status, text
            )));
        }

        resp.json()
            .await
            .map_err(|e| BitRagError::Http(e.to_string()))
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BitRagError::Config(format!("HTTP client: {e}")))
}

/// Extract embeddings from an OpenAI `/embeddings` response, ordered by `index`.
pub fn parse_embeddings(json: &Value, expected: usize) -> Result<Vec<EmbeddingVector>> {
    let data = json["data"]
        .as_array()
        .ok_or_else(|| BitRagError::Upstream("No data in embeddings response".into()))?;

    if data.len() != expected {
        return Err(BitRagError::Upstream(format!(
            "Expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    // Every index in 0..expected must be filled exactly once.
    let mut slots: Vec<Option<EmbeddingVector>> = vec![None; expected];
    for (position, item) in data.iter().enumerate() {
        let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(position);
        let values = item["embedding"]
            .as_array()
            .ok_or_else(|| BitRagError::Upstream(format!("Embedding {index} is not an array")))?;
        let vector = values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| BitRagError::Upstream(format!("Non-numeric value in embedding {index}")))
            })
            .collect::<Result<EmbeddingVector>>()?;
        let slot = slots.get_mut(index).ok_or_else(|| {
            BitRagError::Upstream(format!("Embedding index {index} out of range for {expected} inputs"))
        })?;
        if slot.replace(vector).is_some() {
            return Err(BitRagError::Upstream(format!("Duplicate embedding index {index}")));
        }
    }
    Ok(slots.into_iter().flatten().collect())
}

/// Extract the first choice's message content from a chat completion.
pub fn parse_completion(json: &Value) -> Result<String> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| BitRagError::Upstream("No choices in response".into()))?;
    Ok(choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.check_auth()?;
        let path = self.embeddings_path.as_deref().ok_or_else(|| {
            BitRagError::Config(format!("provider '{}' has no embeddings endpoint", self.name))
        })?;

        let body = json!({
            "model": self.model,
            "input": texts,
        });
        let json = self.post_json(path, &body).await?;
        parse_embeddings(&json, texts.len())
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.check_auth()?;
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let json = self.post_json(&self.chat_path, &body).await?;
        parse_completion(&json)
    }
}
