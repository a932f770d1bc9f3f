//! Reasoning-service clients used by the relevance selector.
//!
//! - **disabled**: [`DisabledReasoning`] always fails, so every selection
//!   degrades to the ordered-prefix fallback.
//! - **openai**: [`OpenAiReasoning`] sends the selection prompt as a single
//!   user message to an OpenAI-compatible `chat/completions` endpoint.
//!
//! The overall call bound is enforced by the selector's timeout, not here;
//! the HTTP client timeout only guards against a hung connection.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use context_select_core::selector::ReasoningService;
use context_select_core::ReasoningError;

use crate::config::ReasoningConfig;

/// Always errors; selection falls back to reading order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledReasoning;

#[async_trait]
impl ReasoningService for DisabledReasoning {
    async fn complete(&self, _prompt: &str) -> Result<String, ReasoningError> {
        Err(ReasoningError::Service(
            "reasoning provider is disabled".to_string(),
        ))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client.
pub struct OpenAiReasoning {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiReasoning {
    pub fn new(config: &ReasoningConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("reasoning.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.saturating_add(5)))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            endpoint: chat_endpoint(&config.base_url),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

fn chat_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// First choice's message content, or a service error when there is none.
fn first_choice(response: ChatResponse) -> Result<String, ReasoningError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ReasoningError::Service("response had no message content".to_string()))
}

#[async_trait]
impl ReasoningService for OpenAiReasoning {
    async fn complete(&self, prompt: &str) -> Result<String, ReasoningError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "sending selection prompt");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ReasoningError::Service(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "chat completion failed");
            return Err(ReasoningError::Service(format!(
                "chat completion error {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReasoningError::Service(format!("unreadable response: {}", e)))?;
        first_choice(parsed)
    }
}

/// Build the reasoning service named by `reasoning.provider`.
pub fn create_reasoning(config: &ReasoningConfig) -> Result<Box<dyn ReasoningService>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledReasoning)),
        "openai" => Ok(Box::new(OpenAiReasoning::new(config)?)),
        other => bail!("Unknown reasoning provider: {}", other),
    }
}
