//! Groq backend. Groq exposes the OpenAI chat wire format verbatim, so this
//! is the OpenAI backend pointed at Groq's base URL by default.

use async_trait::async_trait;
use webpilot_core::types::ChatMessage;
use webpilot_core::Result;

use crate::openai::OpenAiBackend;
use crate::CompletionBackend;

const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

pub struct GroqBackend {
    inner: OpenAiBackend,
}

impl GroqBackend {
    pub fn new(api_key: &str, api_base: Option<&str>, model: &str) -> Result<Self> {
        Ok(Self {
            inner: OpenAiBackend::new(api_key, Some(api_base.unwrap_or(GROQ_API_BASE)), model)?,
        })
    }
}

#[async_trait]
impl CompletionBackend for GroqBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.inner.complete(messages).await
    }
}
