pub mod azure;
pub mod factory;
pub mod fixture;
pub mod groq;
pub mod llm;
pub mod openai;
pub mod prompt;

use async_trait::async_trait;
use std::time::Duration;
use webpilot_core::types::{ChatMessage, HistoryEntry, Plan};
use webpilot_core::{Error, Result};

pub use factory::create_planner;
pub use fixture::FixtureBackend;
pub use llm::LlmPlanner;

/// Produces the next structured decision for a running session.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, task: &str, history: &[HistoryEntry], observation: &str) -> Result<Plan>;
}

impl std::fmt::Debug for dyn Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Planner")
    }
}

/// One chat-completion call against a concrete LLM endpoint. Backends only
/// move messages and text; decision parsing lives in [`LlmPlanner`].
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::Planner(format!("Failed to build HTTP client: {}", e)))
}
