//! Session record lifecycle over the durable store.
//!
//! Updates are read-modify-write and assume at most one concurrent writer
//! per session (the owning orchestrator run). Introducing a second writer
//! requires upgrading these to compare-and-swap; until then the scheduler
//! enforces one run per session id.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;
use webpilot_core::types::{Session, SessionStatus, Step};
use webpilot_core::Result;

use crate::kv::KvStore;

const KEY_PREFIX: &str = "session:";

/// Typed partial update applied to a session record.
#[derive(Debug, Default, Clone)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub task: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl SessionPatch {
    pub fn status(status: SessionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn running(task: &str) -> Self {
        Self {
            status: Some(SessionStatus::Running),
            task: Some(task.to_string()),
            ..Default::default()
        }
    }

    pub fn completed(result: &str) -> Self {
        Self {
            status: Some(SessionStatus::Completed),
            result: Some(result.to_string()),
            ..Default::default()
        }
    }

    pub fn failed(error: &str) -> Self {
        Self {
            status: Some(SessionStatus::Failed),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    fn key(session_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, session_id)
    }

    /// Allocates a fresh id and writes the initial `ready` record.
    pub async fn create(&self) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        let session = Session::new(&session_id);
        self.write(&session).await?;
        Ok(session_id)
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        match self.kv.get(&Self::key(session_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Merges the patch into the record and refreshes the TTL.
    /// A missing (expired) session is a silent no-op, not an error.
    pub async fn update(&self, session_id: &str, patch: SessionPatch) -> Result<()> {
        let Some(mut session) = self.get(session_id).await? else {
            debug!(session_id, "Update on missing session, skipping");
            return Ok(());
        };
        if let Some(status) = patch.status {
            session.status = status;
        }
        if let Some(task) = patch.task {
            session.task = task;
        }
        if let Some(result) = patch.result {
            session.result = Some(result);
        }
        if let Some(error) = patch.error {
            session.error = Some(error);
        }
        session.updated_at = Utc::now();
        self.write(&session).await
    }

    /// Appends one step and refreshes the TTL; no-op when the record is gone.
    pub async fn append_step(&self, session_id: &str, step: Step) -> Result<()> {
        let Some(mut session) = self.get(session_id).await? else {
            debug!(session_id, "Append on missing session, skipping");
            return Ok(());
        };
        session.steps.push(step);
        session.updated_at = Utc::now();
        self.write(&session).await
    }

    async fn write(&self, session: &Session) -> Result<()> {
        let raw = serde_json::to_string(session)?;
        self.kv
            .set(&Self::key(&session.session_id), raw, self.ttl)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use serde_json::json;
    use webpilot_core::types::{Plan, ToolResult};

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryKv::new()), Duration::from_secs(3600))
    }

    fn step(index: u32) -> Step {
        Step {
            index,
            plan: Plan::no_op(),
            result: ToolResult::ok(json!("ok")),
        }
    }

    #[tokio::test]
    async fn test_create_then_get_is_ready_and_empty() {
        let store = store();
        let id = store.create().await.unwrap();
        let session = store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Ready);
        assert!(session.steps.is_empty());
        assert!(session.result.is_none());
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = store();
        let id = store.create().await.unwrap();
        store
            .update(&id, SessionPatch::running("find rust docs"))
            .await
            .unwrap();
        let session = store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.task, "find rust docs");

        store
            .update(&id, SessionPatch::completed("done"))
            .await
            .unwrap();
        let session = store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.result.as_deref(), Some("done"));
        // Earlier fields survive a partial update.
        assert_eq!(session.task, "find rust docs");
    }

    #[tokio::test]
    async fn test_update_missing_session_is_noop() {
        let store = store();
        store
            .update("no-such-id", SessionPatch::failed("boom"))
            .await
            .unwrap();
        assert!(store.get("no-such-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_steps_preserve_order() {
        let store = store();
        let id = store.create().await.unwrap();
        for i in 0..3 {
            store.append_step(&id, step(i)).await.unwrap();
        }
        let session = store.get(&id).await.unwrap().unwrap();
        let indices: Vec<u32> = session.steps.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_reads_not_found() {
        let store = SessionStore::new(Arc::new(MemoryKv::new()), Duration::from_secs(10));
        let id = store.create().await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.get(&id).await.unwrap().is_none());
        // And mutations after expiry are silent no-ops.
        store.append_step(&id, step(0)).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_creates_yield_distinct_ids() {
        let store = store();
        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.create().await.unwrap() }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 10);
        for id in &ids {
            assert!(store.get(id).await.unwrap().is_some());
        }
    }
}
