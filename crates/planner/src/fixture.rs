//! Deterministic offline backend for tests and demos. Scripts a short
//! open/type/finish run by inspecting the step history embedded in the
//! system prompt, exercising the same decision-parsing path as real
//! backends.

use async_trait::async_trait;
use serde_json::json;
use webpilot_core::types::ChatMessage;
use webpilot_core::Result;

use crate::CompletionBackend;

#[derive(Default)]
pub struct FixtureBackend;

impl FixtureBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CompletionBackend for FixtureBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let system = messages
            .first()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let history = system
            .split("Previous Steps:")
            .nth(1)
            .unwrap_or_default();

        let decision = if !history.contains("open_url") {
            json!({
                "thought_summary": "I need to navigate to google.com first.",
                "action": "open_url",
                "args": { "url": "https://google.com" },
                "confidence": 1.0,
                "done": false
            })
        } else if !history.contains("type_text") {
            json!({
                "thought_summary": "I am on google, I will type the search query.",
                "action": "type_text",
                "args": { "selector": "textarea[name='q']", "text": "Agentic RPA" },
                "confidence": 1.0,
                "done": false
            })
        } else {
            json!({
                "thought_summary": "I have typed the text, I am done for this test.",
                "action": "finish",
                "args": { "final_answer": "Searched for Agentic RPA" },
                "confidence": 1.0,
                "done": true
            })
        };
        Ok(decision.to_string())
    }
}
