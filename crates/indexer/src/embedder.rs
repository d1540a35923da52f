//! Embedding providers.
//!
//! `reconfigure` is the only way to obtain a provider from settings: it
//! returns a new immutable provider that callers swap in atomically. The
//! local embedder is deterministic (hashed bag-of-words) and backs tests;
//! the HTTP embedder implements the production path.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;

use toolflow_config::EmbeddingConfig;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Embedding request failed: {0}")]
    Request(String),

    #[error("Malformed embedding response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// One vector per input text, all the same dimension.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Build a provider from settings. Settings changes produce a NEW provider;
/// existing providers are never mutated.
pub fn reconfigure(config: &EmbeddingConfig, api_key: Option<&str>) -> Arc<dyn Embedder> {
    match config.backend.as_str() {
        "http" => Arc::new(HttpEmbedder::new(
            config
                .api_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/embeddings".into()),
            config.model.clone(),
            api_key.map(str::to_string),
        )),
        _ => Arc::new(LocalEmbedder::new(config.dimensions)),
    }
}

// ── Local (deterministic) embedder ────────────────────────────────────────

/// Hashed bag-of-words embedding. Deterministic and cheap; shared tokens
/// between query and chunk produce high cosine similarity, which is all the
/// retrieval tests and the offline path need.
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 2)
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimensions;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 1e-10 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn name(&self) -> &str {
        "local"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ── HTTP embedder ─────────────────────────────────────────────────────────

/// OpenAI-compatible `/embeddings` endpoint client.
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            model,
            api_key,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        "http"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut request = self.client.post(&self.url).json(&serde_json::json!({
            "model": self.model,
            "input": texts,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbedError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EmbedError::Request(format!("status {status}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EmbedError::Malformed(e.to_string()))?;
        let data = body
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| EmbedError::Malformed("missing data array".into()))?;

        data.iter()
            .map(|item| {
                serde_json::from_value(item.get("embedding").cloned().unwrap_or_default())
                    .map_err(|e| EmbedError::Malformed(e.to_string()))
            })
            .collect()
    }
}
