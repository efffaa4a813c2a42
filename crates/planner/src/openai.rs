//! OpenAI-compatible chat-completions backend. Also covers any relay that
//! speaks the same wire format when `apiBase` points elsewhere.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};
use webpilot_core::types::ChatMessage;
use webpilot_core::{Error, Result};

use crate::{build_http_client, CompletionBackend};

pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(api_key: &str, api_base: Option<&str>, model: &str) -> Result<Self> {
        let resolved_base = api_base
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client: build_http_client()?,
            api_key: api_key.to_string(),
            api_base: resolved_base,
            model: model.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub response_format: Value,
}

impl ChatRequest {
    /// Deterministic, JSON-constrained request for planner decisions.
    pub fn planning(model: &str, messages: &[ChatMessage]) -> Self {
        Self {
            model: model.to_string(),
            messages: messages.to_vec(),
            temperature: 0.0,
            response_format: json!({ "type": "json_object" }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    pub content: Option<String>,
}

impl ChatResponse {
    pub fn into_content(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Planner("No content in response".to_string()))
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = ChatRequest::planning(&self.model, messages);
        debug!(url = %url, model = %self.model, messages = messages.len(), "Calling planner LLM");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Planner(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(status = %status, body = %body, "Planner API error");
            return Err(Error::Planner(format!("API error {}: {}", status, body)));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Planner(format!("Failed to parse response: {}", e)))?;
        parsed.into_content()
    }
}
