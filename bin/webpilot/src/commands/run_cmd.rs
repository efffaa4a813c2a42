use webpilot_core::{Config, Paths};

/// Run one task to a terminal state in this process and print the final
/// session record.
pub async fn run(task: &str) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let runtime = super::build_runtime(&config, &paths)?;

    let session_id = runtime.sessions.create().await?;
    runtime.orchestrator.run_session(&session_id, task).await;

    match runtime.sessions.get(&session_id).await? {
        Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
        None => println!("Session expired before it could be read back."),
    }
    Ok(())
}
