//! Planner construction from configuration.

use std::sync::Arc;
use tracing::info;
use webpilot_core::{Config, Error, Result};

use crate::azure::AzureBackend;
use crate::fixture::FixtureBackend;
use crate::groq::GroqBackend;
use crate::openai::OpenAiBackend;
use crate::{CompletionBackend, LlmPlanner, Planner};

/// Build the configured planner. Every backend, the offline fixture
/// included, runs through [`LlmPlanner`] so decision parsing is uniform.
pub fn create_planner(config: &Config) -> Result<Arc<dyn Planner>> {
    let provider = config.planner.provider.as_str();
    let model = config.planner.model.as_str();
    info!(provider, model, "Creating planner");

    let backend: Arc<dyn CompletionBackend> = match provider {
        "fixture" => Arc::new(FixtureBackend::new()),
        "openai" => {
            let p = require_provider(config, "openai")?;
            Arc::new(OpenAiBackend::new(&p.api_key, p.api_base.as_deref(), model)?)
        }
        "azure" => {
            let p = require_provider(config, "azure")?;
            let endpoint = p.api_base.as_deref().ok_or_else(|| {
                Error::Config("Azure provider requires 'apiBase' (resource endpoint)".to_string())
            })?;
            Arc::new(AzureBackend::new(
                &p.api_key,
                endpoint,
                model,
                p.api_version.as_deref(),
            )?)
        }
        "groq" => {
            let p = require_provider(config, "groq")?;
            Arc::new(GroqBackend::new(&p.api_key, p.api_base.as_deref(), model)?)
        }
        other => {
            return Err(Error::Config(format!("Unknown planner provider: {}", other)));
        }
    };

    Ok(Arc::new(LlmPlanner::new(
        backend,
        config.agent.history_window,
        config.planner.max_retries,
    )))
}

fn require_provider<'a>(
    config: &'a Config,
    name: &str,
) -> Result<&'a webpilot_core::config::ProviderConfig> {
    let provider = config
        .get_provider(name)
        .ok_or_else(|| Error::Config(format!("Provider '{}' is not configured", name)))?;
    if provider.api_key.is_empty() {
        return Err(Error::Config(format!(
            "Provider '{}' has no API key configured",
            name
        )));
    }
    Ok(provider)
}
