//! The per-session control loop.
//!
//! One orchestrator run owns one session record for its whole lifetime:
//! it is the only writer of that record, and the browsing context it
//! acquires is released on every exit path. Planner and tool failures are
//! absorbed into steps; only losing the browsing context or the store
//! fails the run.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use webpilot_core::config::AgentConfig;
use webpilot_core::types::{Action, HistoryEntry, Plan, SessionStatus, Step};
use webpilot_core::{input_channel, updates_channel, Error, Result, SessionEvent};
use webpilot_planner::Planner;
use webpilot_store::{EventChannel, SessionPatch, SessionStore};
use webpilot_tools::{PageSession, ToolRunner};

pub struct Orchestrator {
    sessions: SessionStore,
    planner: Arc<dyn Planner>,
    runner: Arc<dyn ToolRunner>,
    events: Arc<dyn EventChannel>,
    max_steps: u32,
    input_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(
        sessions: SessionStore,
        planner: Arc<dyn Planner>,
        runner: Arc<dyn ToolRunner>,
        events: Arc<dyn EventChannel>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            sessions,
            planner,
            runner,
            events,
            max_steps: config.max_steps,
            input_timeout: config.input_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Run one session to a terminal state. Unrecoverable errors are
    /// persisted as `failed`; the page is closed on every exit path.
    pub async fn run_session(&self, session_id: &str, task: &str) {
        info!(session_id, "Session started");

        let mut page = match self.runner.open_page().await {
            Ok(page) => page,
            Err(e) => {
                error!(session_id, error = %e, "Session failed");
                let _ = self
                    .sessions
                    .update(session_id, SessionPatch::failed(&e.to_string()))
                    .await;
                return;
            }
        };

        let outcome = self.drive(session_id, task, page.as_mut()).await;
        page.close().await;

        if let Err(e) = outcome {
            error!(session_id, error = %e, "Session failed");
            let _ = self
                .sessions
                .update(session_id, SessionPatch::failed(&e.to_string()))
                .await;
        }
    }

    async fn drive(
        &self,
        session_id: &str,
        task: &str,
        page: &mut dyn PageSession,
    ) -> Result<()> {
        self.sessions
            .update(session_id, SessionPatch::running(task))
            .await?;

        // Subscribed before the first turn: interjections sent while the
        // loop is still running are not lost, only read later.
        let mut input = self.events.subscribe(&input_channel(session_id)).await?;

        let mut task = task.to_string();
        let mut history: Vec<HistoryEntry> = Vec::new();
        let mut next_index: u32 = 0;

        loop {
            let mut budget = self.max_steps;
            while budget > 0 {
                budget -= 1;

                // Observe. The URL is deliberately minimal; richer page
                // digests would slot in here.
                let observation = format!("Current URL: {}", page.current_url());

                // Think. Planning failures become a neutral no-op step so
                // the loop always advances one tick.
                let plan = match self.planner.plan(&task, &history, &observation).await {
                    Ok(plan) => plan,
                    Err(e) => {
                        warn!(session_id, error = %e, "Planning failed, substituting no-op");
                        Plan::no_op()
                    }
                };

                // Decide.
                if let Action::Finish { final_answer } = &plan.action {
                    self.sessions
                        .update(session_id, SessionPatch::completed(final_answer))
                        .await?;
                    self.publish(session_id, &SessionEvent::agent_chat(final_answer))
                        .await;
                    info!(session_id, "Session completed");
                    return Ok(());
                }

                // Act. All tool outcomes, failures included, come back as a
                // result; nothing here aborts the run.
                let result = page.execute(&plan.action).await;

                // Stream a frame, best-effort.
                match page.screenshot().await {
                    Ok(data) => {
                        let event = SessionEvent::Image {
                            data: format!("data:image/jpeg;base64,{}", data),
                        };
                        self.publish(session_id, &event).await;
                    }
                    Err(e) => debug!(session_id, "Screenshot failed: {}", e),
                }

                // Record.
                let step = Step {
                    index: next_index,
                    plan,
                    result,
                };
                next_index += 1;
                history.push(HistoryEntry::Step(step.clone()));
                self.sessions.append_step(session_id, step).await?;
            }

            // Budget exhausted without finish: park and wait for a viewer
            // to redirect the task.
            self.sessions
                .update(session_id, SessionPatch::status(SessionStatus::WaitingForInput))
                .await?;
            info!(session_id, "Waiting for input");

            let message = match self.input_timeout {
                Some(deadline) => timeout(deadline, input.next()).await.map_err(|_| {
                    Error::Timeout(format!(
                        "No input received within {}s",
                        deadline.as_secs()
                    ))
                })?,
                None => input.next().await,
            };
            let Some(new_task) = message else {
                return Err(Error::Channel("Input channel closed".to_string()));
            };

            info!(session_id, "Received new input, resuming");
            history.push(HistoryEntry::user(&new_task));
            task = new_task;
            self.sessions
                .update(session_id, SessionPatch::running(&task))
                .await?;
        }
    }

    async fn publish(&self, session_id: &str, event: &SessionEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(session_id, "Failed to encode event: {}", e);
                return;
            }
        };
        if let Err(e) = self.events.publish(&updates_channel(session_id), payload).await {
            warn!(session_id, "Failed to publish event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use webpilot_core::types::ToolResult;
    use webpilot_planner::{FixtureBackend, LlmPlanner};
    use webpilot_store::{MemoryChannel, MemoryKv};

    /// Returns plans from a script, recording the history it was shown.
    struct ScriptedPlanner {
        script: Mutex<Vec<Result<Plan>>>,
        seen_histories: Mutex<Vec<Vec<HistoryEntry>>>,
    }

    impl ScriptedPlanner {
        fn new(script: Vec<Result<Plan>>) -> Self {
            let mut script = script;
            script.reverse();
            Self {
                script: Mutex::new(script),
                seen_histories: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Planner for ScriptedPlanner {
        async fn plan(
            &self,
            _task: &str,
            history: &[HistoryEntry],
            _observation: &str,
        ) -> Result<Plan> {
            self.seen_histories.lock().unwrap().push(history.to_vec());
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(Error::Planner("script exhausted".to_string())))
        }
    }

    struct FakePage {
        fail_first: bool,
        executed: usize,
    }

    #[async_trait]
    impl PageSession for FakePage {
        fn current_url(&self) -> String {
            "about:blank".to_string()
        }

        async fn execute(&mut self, action: &Action) -> ToolResult {
            self.executed += 1;
            if self.fail_first && self.executed == 1 {
                return ToolResult::failure("Timeout waiting for selector");
            }
            match action {
                Action::Unknown(name) => ToolResult::failure(format!("Tool {} not found", name)),
                _ => ToolResult::ok(json!(format!("ran {}", action.name()))),
            }
        }

        async fn screenshot(&self) -> Result<String> {
            Ok("Zm9v".to_string())
        }

        async fn close(&mut self) {}
    }

    struct FakeRunner {
        fail_first: bool,
        fail_open: bool,
    }

    #[async_trait]
    impl ToolRunner for FakeRunner {
        async fn open_page(&self) -> Result<Box<dyn PageSession>> {
            if self.fail_open {
                return Err(Error::Browser("Chrome not found".to_string()));
            }
            Ok(Box::new(FakePage {
                fail_first: self.fail_first,
                executed: 0,
            }))
        }
    }

    fn plan_for(action: Action) -> Plan {
        Plan {
            thought_summary: "test".to_string(),
            done: action.is_finish(),
            confidence: 1.0,
            action,
        }
    }

    struct Harness {
        sessions: SessionStore,
        events: Arc<MemoryChannel>,
    }

    fn orchestrator(
        planner: Arc<dyn Planner>,
        runner: Arc<dyn ToolRunner>,
        max_steps: u32,
    ) -> (Orchestrator, Harness) {
        let sessions = SessionStore::new(Arc::new(MemoryKv::new()), Duration::from_secs(3600));
        let events = Arc::new(MemoryChannel::new());
        let config = AgentConfig {
            max_steps,
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(
            sessions.clone(),
            planner,
            runner,
            events.clone(),
            &config,
        );
        (
            orchestrator,
            Harness { sessions, events },
        )
    }

    async fn wait_for_status(harness: &Harness, id: &str, status: SessionStatus) {
        timeout(Duration::from_secs(5), async {
            loop {
                if let Some(session) = harness.sessions.get(id).await.unwrap() {
                    if session.status == status {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("status never reached");
    }

    #[tokio::test]
    async fn test_finish_completes_with_result() {
        let planner = Arc::new(ScriptedPlanner::new(vec![
            Ok(plan_for(Action::OpenUrl {
                url: "https://example.com".to_string(),
            })),
            Ok(plan_for(Action::Finish {
                final_answer: "All done".to_string(),
            })),
        ]));
        let runner = Arc::new(FakeRunner {
            fail_first: false,
            fail_open: false,
        });
        let (orch, harness) = orchestrator(planner, runner, 20);

        let id = harness.sessions.create().await.unwrap();
        orch.run_session(&id, "do things").await;

        let session = harness.sessions.get(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.result.as_deref(), Some("All done"));
        // The finish decision itself is not recorded as a step.
        assert_eq!(session.steps.len(), 1);
        assert_eq!(session.steps[0].index, 0);
    }

    #[tokio::test]
    async fn test_final_answer_is_published_to_viewers() {
        let planner = Arc::new(ScriptedPlanner::new(vec![Ok(plan_for(Action::Finish {
            final_answer: "42".to_string(),
        }))]));
        let runner = Arc::new(FakeRunner {
            fail_first: false,
            fail_open: false,
        });
        let (orch, harness) = orchestrator(planner, runner, 20);

        let id = harness.sessions.create().await.unwrap();
        let mut updates = harness
            .events
            .subscribe(&updates_channel(&id))
            .await
            .unwrap();
        orch.run_session(&id, "answer").await;

        let payload = timeout(Duration::from_secs(5), updates.next())
            .await
            .unwrap()
            .unwrap();
        let event: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(event["type"], "chat");
        assert_eq!(event["sender"], "agent");
        assert_eq!(event["message"], "42");
    }

    #[tokio::test]
    async fn test_budget_exhaustion_parks_then_resumes() {
        let planner = Arc::new(ScriptedPlanner::new(vec![
            Ok(plan_for(Action::GetPageText)),
            Ok(plan_for(Action::GetPageText)),
            Ok(plan_for(Action::Finish {
                final_answer: "resumed and finished".to_string(),
            })),
        ]));
        let runner = Arc::new(FakeRunner {
            fail_first: false,
            fail_open: false,
        });
        let (orch, harness) = orchestrator(planner.clone(), runner, 2);

        let id = harness.sessions.create().await.unwrap();
        let events = harness.events.clone();
        let run_id = id.clone();
        let handle = tokio::spawn(async move { orch.run_session(&run_id, "first task").await });

        wait_for_status(&harness, &id, SessionStatus::WaitingForInput).await;
        events
            .publish(&input_channel(&id), "keep going".to_string())
            .await
            .unwrap();

        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

        let session = harness.sessions.get(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.result.as_deref(), Some("resumed and finished"));
        assert_eq!(session.task, "keep going");
        // Indices stay gapless across the interjection.
        let indices: Vec<u32> = session.steps.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1]);

        // The planner saw the interjection as a user turn after the steps.
        let histories = planner.seen_histories.lock().unwrap();
        let last = histories.last().unwrap();
        assert_eq!(last.len(), 3);
        match &last[2] {
            HistoryEntry::UserTurn { role, content } => {
                assert_eq!(role, "user");
                assert_eq!(content, "keep going");
            }
            other => panic!("expected user turn, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_waiting_times_out_when_configured() {
        let planner = Arc::new(ScriptedPlanner::new(vec![Ok(plan_for(Action::Wait))]));
        let runner = Arc::new(FakeRunner {
            fail_first: false,
            fail_open: false,
        });
        let sessions = SessionStore::new(Arc::new(MemoryKv::new()), Duration::from_secs(3600));
        let events = Arc::new(MemoryChannel::new());
        let config = AgentConfig {
            max_steps: 1,
            input_timeout_secs: Some(1),
            ..Default::default()
        };
        let orch = Orchestrator::new(
            sessions.clone(),
            planner,
            runner,
            events,
            &config,
        );

        let id = sessions.create().await.unwrap();
        timeout(Duration::from_secs(5), orch.run_session(&id, "t"))
            .await
            .unwrap();

        let session = sessions.get(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert!(session.error.unwrap().contains("No input received"));
    }

    #[tokio::test]
    async fn test_tool_failure_is_recorded_and_run_continues() {
        let planner = Arc::new(ScriptedPlanner::new(vec![
            Ok(plan_for(Action::Click {
                selector: "#missing".to_string(),
            })),
            Ok(plan_for(Action::Finish {
                final_answer: "done despite failure".to_string(),
            })),
        ]));
        let runner = Arc::new(FakeRunner {
            fail_first: true,
            fail_open: false,
        });
        let (orch, harness) = orchestrator(planner, runner, 20);

        let id = harness.sessions.create().await.unwrap();
        orch.run_session(&id, "click it").await;

        let session = harness.sessions.get(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(!session.steps[0].result.success);
        assert!(!session.steps[0]
            .result
            .error
            .as_deref()
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_planner_failure_becomes_no_op_step() {
        let planner = Arc::new(ScriptedPlanner::new(vec![
            Err(Error::Planner("provider unreachable".to_string())),
            Ok(plan_for(Action::Finish {
                final_answer: "recovered".to_string(),
            })),
        ]));
        let runner = Arc::new(FakeRunner {
            fail_first: false,
            fail_open: false,
        });
        let (orch, harness) = orchestrator(planner, runner, 20);

        let id = harness.sessions.create().await.unwrap();
        orch.run_session(&id, "t").await;

        let session = harness.sessions.get(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.steps.len(), 1);
        assert_eq!(session.steps[0].plan.action, Action::Wait);
        assert!(session.steps[0].result.success);
    }

    #[tokio::test]
    async fn test_unopenable_browser_fails_the_run() {
        let planner = Arc::new(ScriptedPlanner::new(vec![]));
        let runner = Arc::new(FakeRunner {
            fail_first: false,
            fail_open: true,
        });
        let (orch, harness) = orchestrator(planner, runner, 20);

        let id = harness.sessions.create().await.unwrap();
        orch.run_session(&id, "t").await;

        let session = harness.sessions.get(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert!(session.error.unwrap().contains("Chrome not found"));
    }

    #[tokio::test]
    async fn test_end_to_end_with_fixture_backend() {
        let planner = Arc::new(LlmPlanner::new(Arc::new(FixtureBackend::new()), 5, 0));
        let runner = Arc::new(FakeRunner {
            fail_first: false,
            fail_open: false,
        });
        let (orch, harness) = orchestrator(planner, runner, 20);

        let id = harness.sessions.create().await.unwrap();
        orch.run_session(&id, "search for Agentic RPA").await;

        let session = harness.sessions.get(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.result.as_deref(), Some("Searched for Agentic RPA"));
        assert!(session.steps.len() >= 2);
        assert_eq!(session.steps[0].plan.action.name(), "open_url");
        assert_eq!(session.steps[1].plan.action.name(), "type_text");
    }

    #[tokio::test]
    async fn test_image_frames_stream_during_run() {
        let planner = Arc::new(ScriptedPlanner::new(vec![
            Ok(plan_for(Action::GetPageText)),
            Ok(plan_for(Action::Finish {
                final_answer: "done".to_string(),
            })),
        ]));
        let runner = Arc::new(FakeRunner {
            fail_first: false,
            fail_open: false,
        });
        let (orch, harness) = orchestrator(planner, runner, 20);

        let id = harness.sessions.create().await.unwrap();
        let mut updates = harness
            .events
            .subscribe(&updates_channel(&id))
            .await
            .unwrap();
        orch.run_session(&id, "t").await;

        let payload = timeout(Duration::from_secs(5), updates.next())
            .await
            .unwrap()
            .unwrap();
        let event: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(event["type"], "image");
        assert_eq!(event["data"], "data:image/jpeg;base64,Zm9v");
    }
}
