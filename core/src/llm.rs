//! Generation backend client.
//!
//! The backend is an untrusted external collaborator: it may be absent, slow
//! or wrong. Everything above this module talks to the [`ChatBackend`] trait
//! so tests (and the deterministic fallback path) never need a live service.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// One chat message in provider wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Text-completion service: message list in, one completion out.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: usize,
    ) -> Result<String>;
}

/// Supported backend protocols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI-compatible `/chat/completions` endpoint.
    OpenAi,
    /// Ollama `/api/chat` endpoint.
    Ollama,
}

/// Generation backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    /// Decoding temperature; kept low to minimize invention.
    pub temperature: f64,
    pub max_tokens: usize,
    /// Request timeout; a timed-out call counts as a backend failure.
    pub timeout_seconds: u64,
    pub enabled: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            api_key: None,
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_tokens: 600,
            timeout_seconds: 30,
            enabled: true,
        }
    }
}

/// HTTP client for the configured generation backend.
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Build a client from configuration. Fails when the backend is disabled
    /// or unusable; callers treat that as "no backend" and run the
    /// deterministic strategy for the process lifetime.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        if !config.enabled {
            bail!("generation backend disabled in configuration");
        }
        if config.model.trim().is_empty() {
            bail!("generation backend has no model configured");
        }
        if config.provider == LlmProvider::OpenAi
            && config.api_key.is_none()
            && config.base_url.is_none()
        {
            bail!("OpenAI-compatible backend needs an API key or a base URL");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| anyhow!("failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete_openai(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: usize,
    ) -> Result<String> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1");
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        let request = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(api_key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = builder.json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("chat completion request failed ({status}): {body}");
        }

        let body: serde_json::Value = response.json().await?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("chat completion response had no content"))?;
        Ok(content.trim().to_string())
    }

    async fn complete_ollama(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: usize,
    ) -> Result<String> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("http://localhost:11434");
        let url = format!("{}/api/chat", base_url.trim_end_matches('/'));

        let request = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            }
        });

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("chat request failed ({status}): {body}");
        }

        let body: serde_json::Value = response.json().await?;
        let content = body["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("chat response had no content"))?;
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: usize,
    ) -> Result<String> {
        let request_id = Uuid::new_v4();
        debug!(
            "Sending completion request {request_id} ({} messages, model {})",
            messages.len(),
            self.config.model
        );
        match self.config.provider {
            LlmProvider::OpenAi => self.complete_openai(messages, temperature, max_tokens).await,
            LlmProvider::Ollama => self.complete_ollama(messages, temperature, max_tokens).await,
        }
    }
}
