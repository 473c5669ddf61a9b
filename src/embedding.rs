//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and two backends:
//! - **[`OpenAiEmbedder`]** — calls the OpenAI embeddings API.
//! - **[`OllamaEmbedder`]** — calls a local Ollama instance
//!   (`nomic-embed-text` by default).
//!
//! Providers own no retry policy: a failed call surfaces immediately
//! and the Coordinator decides what is fatal for the turn. Empty input
//! is rejected before any network traffic.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;

/// Converts raw query text into a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a single query text.
    ///
    /// Fails with [`EmbeddingError::EmptyInput`] for empty or
    /// whitespace-only text, without touching the network.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Create the configured [`EmbeddingProvider`].
///
/// The OpenAI backend requires `OPENAI_API_KEY` in the environment;
/// the key is resolved here, at construction, so a misconfigured
/// process fails at startup rather than mid-turn. Misconfiguration is
/// a setup failure, not an [`EmbeddingError`].
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        other => anyhow::bail!("unknown embedding provider: '{other}'"),
    }
}

fn build_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

// ============ OpenAI ============

/// Embedding provider backed by `POST /v1/embeddings`.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let api_key =
            std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?;

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let body = json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Transport(format!(
                "OpenAI API error {status}: {body_text}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        let vector: Vec<f32> = payload["data"][0]["embedding"]
            .as_array()
            .ok_or(EmbeddingError::EmptyResponse)?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if vector.is_empty() {
            return Err(EmbeddingError::EmptyResponse);
        }

        debug!(model = %self.model, dims = vector.len(), "embedded query");
        Ok(vector)
    }
}

// ============ Ollama ============

/// Embedding provider backed by a local Ollama instance.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: config.model.clone(),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let body = json!({
            "model": self.model,
            "prompt": text,
        });

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Transport(format!(
                "Ollama API error {status}: {body_text}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        let vector: Vec<f32> = payload["embedding"]
            .as_array()
            .ok_or(EmbeddingError::EmptyResponse)?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if vector.is_empty() {
            return Err(EmbeddingError::EmptyResponse);
        }

        debug!(model = %self.model, dims = vector.len(), "embedded query");
        Ok(vector)
    }
}
