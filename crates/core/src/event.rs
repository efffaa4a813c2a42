use serde::{Deserialize, Serialize};

/// Live-stream events published on a session's updates channel.
///
/// Wire shape matches what viewers consume directly:
/// `{"type": "chat", "sender": ..., "message": ...}` and
/// `{"type": "image", "data": "data:image/jpeg;base64,..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Chat { sender: String, message: String },
    Image { data: String },
}

impl SessionEvent {
    pub fn agent_chat(message: &str) -> Self {
        SessionEvent::Chat {
            sender: "agent".to_string(),
            message: message.to_string(),
        }
    }
}

/// Orchestrator → viewers channel for one session.
pub fn updates_channel(session_id: &str) -> String {
    format!("session_updates:{}", session_id)
}

/// Viewer → orchestrator interjection channel for one session.
pub fn input_channel(session_id: &str) -> String {
    format!("session_input:{}", session_id)
}
