use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("text generation is not configured")]
    Unavailable,

    #[error("text generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Claude API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("empty completion")]
    EmptyResponse,
}

/// External text-generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Identity recorded on generated insights (the model name).
    fn identity(&self) -> &str;

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError>;
}

pub struct ClaudeGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl ClaudeGenerator {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl TextGenerator for ClaudeGenerator {
    fn identity(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "model": self.model,
                "max_tokens": max_tokens,
                "messages": [{
                    "role": "user",
                    "content": prompt
                }]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, body });
        }

        let body: serde_json::Value = response.json().await?;
        let text = body["content"][0]["text"].as_str().unwrap_or("").trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

/// Stand-in used when no API key is configured. Every call reports
/// `Unavailable`, so insights always take the template path.
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    fn identity(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String, GenerationError> {
        Err(GenerationError::Unavailable)
    }
}

/// Pick the collaborator once at startup.
pub fn from_config(config: &Config) -> Arc<dyn TextGenerator> {
    if config.claude_api_key.is_empty() {
        tracing::info!("CLAUDE_API_KEY not set, insights will use template narratives");
        return Arc::new(DisabledGenerator);
    }

    match ClaudeGenerator::new(
        config.claude_api_key.clone(),
        config.claude_model.clone(),
        Duration::from_secs(config.claude_timeout_secs),
    ) {
        Ok(generator) => Arc::new(generator),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build Claude client, insights will use template narratives");
            Arc::new(DisabledGenerator)
        }
    }
}
