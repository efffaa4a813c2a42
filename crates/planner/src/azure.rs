//! Azure OpenAI backend. Same chat wire format as OpenAI, but the model is
//! addressed as a deployment in the path, the key travels in an `api-key`
//! header, and an `api-version` query parameter is mandatory.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};
use webpilot_core::types::ChatMessage;
use webpilot_core::{Error, Result};

use crate::openai::{ChatRequest, ChatResponse};
use crate::{build_http_client, CompletionBackend};

const DEFAULT_API_VERSION: &str = "2024-02-01";

pub struct AzureBackend {
    client: Client,
    api_key: String,
    endpoint: String,
    deployment: String,
    api_version: String,
}

impl AzureBackend {
    pub fn new(
        api_key: &str,
        endpoint: &str,
        deployment: &str,
        api_version: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_key: api_key.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            deployment: deployment.to_string(),
            api_version: api_version.unwrap_or(DEFAULT_API_VERSION).to_string(),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint, self.deployment
        )
    }
}

#[async_trait]
impl CompletionBackend for AzureBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = self.url();
        let request = ChatRequest::planning(&self.deployment, messages);
        debug!(url = %url, api_version = %self.api_version, "Calling Azure planner LLM");

        let response = self
            .client
            .post(&url)
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Planner(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(status = %status, body = %body, "Azure planner API error");
            return Err(Error::Planner(format!("API error {}: {}", status, body)));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Planner(format!("Failed to parse response: {}", e)))?;
        parsed.into_content()
    }
}
