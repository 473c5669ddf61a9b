//! Generation model client.
//!
//! [`GenerationProvider`] sends an assembled [`Prompt`] to a chat
//! completion endpoint and returns the completion text. The OpenAI
//! backend also speaks to any OpenAI-compatible endpoint (Ollama,
//! vLLM) via `base_url`; local endpoints need no API key.
//!
//! Failure classification matters more than success here: HTTP 429
//! maps to [`GenerationError::Quota`], the only error the Coordinator
//! will retry; a content-filter refusal maps to
//! [`GenerationError::ContentPolicy`]; everything else is transport.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::models::Prompt;

/// Sends one prompt to a generative model, stateless per call.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Complete the prompt and return the answer text.
    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError>;
}

/// Create the configured [`GenerationProvider`].
///
/// Misconfiguration (a missing API key for a remote endpoint) is a
/// setup failure, not a [`GenerationError`].
pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Box<dyn GenerationProvider>> {
    Ok(Box::new(OpenAiGenerator::new(config)?))
}

/// Chat-completions client for OpenAI and compatible endpoints.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let is_local = base_url.contains("localhost") || base_url.contains("127.0.0.1");
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) => key,
            // Local endpoints accept any bearer token.
            Err(_) if is_local => "local".to_string(),
            Err(_) => anyhow::bail!("OPENAI_API_KEY not set"),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

/// Render the prompt's user-facing blocks into a single user message.
///
/// Empty blocks are omitted, so the same rendering serves both full
/// RAG turns and small auxiliary completions (collection routing).
fn render_user_message(prompt: &Prompt) -> String {
    let mut sections = Vec::new();

    if !prompt.history_block.is_empty() {
        sections.push(format!("Conversation so far:\n{}", prompt.history_block));
    }
    if !prompt.context_block.is_empty() {
        sections.push(format!(
            "Relevant passages from Shakespeare's works:\n{}",
            prompt.context_block
        ));
    }
    sections.push(format!("Question: {}", prompt.user_query));

    sections.join("\n\n")
}

/// Map an HTTP error status to the appropriate [`GenerationError`].
fn map_http_error(status: reqwest::StatusCode, body: &str) -> GenerationError {
    if status.as_u16() == 429 {
        GenerationError::Quota(format!("HTTP 429: {body}"))
    } else {
        GenerationError::Transport(format!("HTTP {status}: {body}"))
    }
}

/// Extract the completion text, detecting content-policy refusals.
fn extract_completion(payload: &Value) -> Result<String, GenerationError> {
    let choice = payload["choices"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| GenerationError::Transport("response had no choices".to_string()))?;

    if choice["finish_reason"].as_str() == Some("content_filter") {
        return Err(GenerationError::ContentPolicy(
            "completion stopped by content filter".to_string(),
        ));
    }
    if let Some(refusal) = choice["message"]["refusal"].as_str() {
        if !refusal.is_empty() {
            return Err(GenerationError::ContentPolicy(refusal.to_string()));
        }
    }

    let text = choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .trim()
        .to_string();

    if text.is_empty() {
        return Err(GenerationError::EmptyCompletion);
    }
    Ok(text)
}

#[async_trait]
impl GenerationProvider for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt.system_instructions },
                { "role": "user", "content": render_user_message(prompt) },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body_text));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let text = extract_completion(&payload)?;
        debug!(model = %self.model, chars = text.len(), "completion received");
        Ok(text)
    }
}
