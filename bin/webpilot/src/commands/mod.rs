pub mod onboard;
pub mod run_cmd;
pub mod serve;
pub mod status;

use std::sync::Arc;
use std::time::Duration;
use webpilot_agent::Orchestrator;
use webpilot_core::{Config, Paths};
use webpilot_planner::create_planner;
use webpilot_store::{EventChannel, MemoryChannel, MemoryKv, SessionStore};
use webpilot_tools::BrowserManager;

/// Wired process-level dependencies, built once at startup and passed by
/// reference everywhere they are needed.
pub(crate) struct Runtime {
    pub sessions: SessionStore,
    pub events: Arc<dyn EventChannel>,
    pub orchestrator: Arc<Orchestrator>,
}

pub(crate) fn build_runtime(config: &Config, paths: &Paths) -> anyhow::Result<Runtime> {
    let sessions = SessionStore::new(
        Arc::new(MemoryKv::new()),
        Duration::from_secs(config.session.ttl_secs),
    );
    let events: Arc<dyn EventChannel> = Arc::new(MemoryChannel::new());
    let planner = create_planner(config)?;
    let runner = Arc::new(BrowserManager::new(config.browser.clone(), paths));

    let orchestrator = Arc::new(Orchestrator::new(
        sessions.clone(),
        planner,
        runner,
        events.clone(),
        &config.agent,
    ));

    Ok(Runtime {
        sessions,
        events,
        orchestrator,
    })
}
