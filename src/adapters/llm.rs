//! Text generation backends
//!
//! `ChatCompletionsClient` speaks the OpenAI-compatible
//! `/chat/completions` API, which Ollama also serves under `/v1`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{HedgeflowError, Result};

/// One chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
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
}

/// Free-form text backend. Callers fall back to a canned reply on `Err`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, messages: Vec<ChatTurn>) -> Result<String>;
}

/// Always answers with the same text
#[derive(Debug, Clone)]
pub struct CannedTextGenerator {
    reply: String,
}

impl CannedTextGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

impl Default for CannedTextGenerator {
    fn default() -> Self {
        Self::new("Text generation is disabled; I can only report my current state.")
    }
}

#[async_trait]
impl TextGenerator for CannedTextGenerator {
    async fn generate(&self, _messages: Vec<ChatTurn>) -> Result<String> {
        Ok(self.reply.clone())
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChatTurn,
}

/// OpenAI-compatible chat completions client
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HedgeflowError::Internal(format!("failed to build LLM client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
        })
    }

    fn extract_reply(response: CompletionResponse) -> Result<String> {
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| HedgeflowError::TextGeneration("empty completion".to_string()))
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    async fn generate(&self, messages: Vec<ChatTurn>) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionRequest {
            model: &self.model,
            messages: &messages,
            temperature: self.temperature,
        };

        let mut req = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        debug!("POST {} ({} turns, model {})", url, messages.len(), self.model);
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(HedgeflowError::TextGeneration(format!(
                "completion request failed: status={} body={}",
                status, text
            )));
        }

        Self::extract_reply(resp.json::<CompletionResponse>().await?)
    }
}
