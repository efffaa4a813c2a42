//! Decision parsing on top of any chat-completion backend.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use webpilot_core::types::{HistoryEntry, Plan};
use webpilot_core::{Error, Result};

use crate::prompt::build_messages;
use crate::{CompletionBackend, Planner};

pub struct LlmPlanner {
    backend: Arc<dyn CompletionBackend>,
    history_window: usize,
    max_retries: u32,
}

impl LlmPlanner {
    pub fn new(backend: Arc<dyn CompletionBackend>, history_window: usize, max_retries: u32) -> Self {
        Self {
            backend,
            history_window,
            max_retries,
        }
    }

    /// Parse one raw completion into a plan. Tolerates markdown code fences
    /// around the JSON; anything else malformed is an error the caller maps
    /// to a no-op step.
    fn parse_plan(raw: &str) -> Result<Plan> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|s| s.strip_suffix("```"))
            .unwrap_or(trimmed)
            .trim();
        serde_json::from_str(body)
            .map_err(|e| Error::Planner(format!("Malformed decision: {}. Body: {}", e, body)))
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, task: &str, history: &[HistoryEntry], observation: &str) -> Result<Plan> {
        let messages = build_messages(task, history, observation, self.history_window);

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            match self.backend.complete(&messages).await {
                Ok(raw) => match Self::parse_plan(&raw) {
                    Ok(plan) => {
                        debug!(action = plan.action.name(), confidence = plan.confidence, "Planned");
                        return Ok(plan);
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "Planner returned unparseable decision");
                        last_err = Some(e);
                    }
                },
                Err(e) => {
                    warn!(attempt, error = %e, "Planner backend call failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Planner("No attempts made".to_string())))
    }
}
