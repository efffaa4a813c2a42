use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The closed action vocabulary the planner may choose from.
///
/// Decisions arrive over the wire as `{"action": "<name>", "args": {...}}`;
/// anything outside the vocabulary parses to `Unknown` and is reported back
/// to the planner as a tool-level failure rather than aborting the run.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    OpenUrl { url: String },
    Click { selector: String },
    TypeText { selector: String, text: String },
    GetPageText,
    GetScreenshot,
    /// Neutral no-op, substituted when planning fails.
    Wait,
    Finish { final_answer: String },
    Unknown(String),
}

impl Action {
    /// Build an action from its wire name and argument object.
    /// Missing arguments default to empty strings; the tool layer reports
    /// the resulting failure instead of the parser.
    pub fn parse(name: &str, args: &Value) -> Self {
        let arg = |key: &str| -> String {
            args.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        match name {
            "open_url" => Action::OpenUrl { url: arg("url") },
            "click" => Action::Click { selector: arg("selector") },
            "type_text" => Action::TypeText {
                selector: arg("selector"),
                text: arg("text"),
            },
            "get_page_text" => Action::GetPageText,
            "get_screenshot" => Action::GetScreenshot,
            "wait" => Action::Wait,
            "finish" => Action::Finish {
                final_answer: {
                    let answer = arg("final_answer");
                    if answer.is_empty() {
                        "Task complete.".to_string()
                    } else {
                        answer
                    }
                },
            },
            other => Action::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Action::OpenUrl { .. } => "open_url",
            Action::Click { .. } => "click",
            Action::TypeText { .. } => "type_text",
            Action::GetPageText => "get_page_text",
            Action::GetScreenshot => "get_screenshot",
            Action::Wait => "wait",
            Action::Finish { .. } => "finish",
            Action::Unknown(name) => name,
        }
    }

    /// The wire `args` object for this action.
    pub fn args(&self) -> Value {
        match self {
            Action::OpenUrl { url } => json!({ "url": url }),
            Action::Click { selector } => json!({ "selector": selector }),
            Action::TypeText { selector, text } => {
                json!({ "selector": selector, "text": text })
            }
            Action::Finish { final_answer } => json!({ "final_answer": final_answer }),
            _ => json!({}),
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, Action::Finish { .. })
    }
}

/// One structured decision from the planner.
///
/// Serializes to the wire shape `{thought_summary, action, args, confidence,
/// done}` so persisted steps match what the planner produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub thought_summary: String,
    pub action: Action,
    pub confidence: f32,
    pub done: bool,
}

impl Plan {
    /// The neutral substitute used when planning fails: the loop still
    /// advances one tick, recording a `wait` step.
    pub fn no_op() -> Self {
        Self {
            thought_summary: "Planning failed, waiting before retrying.".to_string(),
            action: Action::Wait,
            confidence: 0.0,
            done: false,
        }
    }
}

impl Serialize for Plan {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("thought_summary", &self.thought_summary)?;
        map.serialize_entry("action", self.action.name())?;
        map.serialize_entry("args", &self.action.args())?;
        map.serialize_entry("confidence", &self.confidence)?;
        map.serialize_entry("done", &self.done)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Plan {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let obj = value
            .as_object()
            .ok_or_else(|| serde::de::Error::custom("expected plan object"))?;

        let action_name = obj
            .get("action")
            .and_then(|v| v.as_str())
            .ok_or_else(|| serde::de::Error::custom("plan missing 'action'"))?;
        let args = obj.get("args").cloned().unwrap_or_else(|| json!({}));
        let action = Action::parse(action_name, &args);

        Ok(Plan {
            thought_summary: obj
                .get("thought_summary")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            confidence: obj
                .get("confidence")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0) as f32,
            done: obj
                .get("done")
                .and_then(|v| v.as_bool())
                .unwrap_or(action.is_finish()),
            action,
        })
    }
}

/// Structured outcome of executing one action against the live page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    /// Seconds spent executing the action.
    pub execution_time: f64,
}

impl ToolResult {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            screenshot: None,
            execution_time: 0.0,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            screenshot: None,
            execution_time: 0.0,
        }
    }
}

/// One completed plan/act/observe tick, immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub index: u32,
    pub plan: Plan,
    pub result: ToolResult,
}

/// Step history as fed back to the planner: completed steps interleaved
/// with mid-run user interjections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryEntry {
    Step(Step),
    UserTurn { role: String, content: String },
}

impl HistoryEntry {
    pub fn user(content: &str) -> Self {
        HistoryEntry::UserTurn {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Ready,
    Running,
    WaitingForInput,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// The durable record for one agent task. Owned by exactly one orchestrator
/// run at a time; reclaimed by TTL expiry, never deleted explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: SessionStatus,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub memory: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Session {
    pub fn new(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            created_at: now,
            updated_at: now,
            status: SessionStatus::Ready,
            task: String::new(),
            steps: Vec::new(),
            memory: serde_json::Map::new(),
            result: None,
            error: None,
        }
    }
}

/// A chat-completion request message for planner backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse_known() {
        let action = Action::parse("open_url", &json!({"url": "https://example.com"}));
        assert_eq!(
            action,
            Action::OpenUrl {
                url: "https://example.com".to_string()
            }
        );
        assert_eq!(action.name(), "open_url");
        assert_eq!(action.args()["url"], "https://example.com");
    }

    #[test]
    fn test_action_parse_type_text() {
        let action = Action::parse(
            "type_text",
            &json!({"selector": "input[name='q']", "text": "hello"}),
        );
        match action {
            Action::TypeText { selector, text } => {
                assert_eq!(selector, "input[name='q']");
                assert_eq!(text, "hello");
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_action_parse_unknown() {
        let action = Action::parse("teleport", &json!({}));
        assert_eq!(action, Action::Unknown("teleport".to_string()));
        assert_eq!(action.name(), "teleport");
    }

    #[test]
    fn test_action_finish_default_answer() {
        let action = Action::parse("finish", &json!({}));
        assert_eq!(
            action,
            Action::Finish {
                final_answer: "Task complete.".to_string()
            }
        );
    }

    #[test]
    fn test_plan_wire_round_trip() {
        let raw = r#"{
            "thought_summary": "Navigate first.",
            "action": "open_url",
            "args": {"url": "https://example.com"},
            "confidence": 0.9,
            "done": false
        }"#;
        let plan: Plan = serde_json::from_str(raw).unwrap();
        assert_eq!(plan.action.name(), "open_url");
        assert!(!plan.done);

        let out = serde_json::to_value(&plan).unwrap();
        assert_eq!(out["action"], "open_url");
        assert_eq!(out["args"]["url"], "https://example.com");
        assert_eq!(out["thought_summary"], "Navigate first.");
    }

    #[test]
    fn test_plan_done_defaults_from_action() {
        let raw = r#"{"action": "finish", "args": {"final_answer": "42"}}"#;
        let plan: Plan = serde_json::from_str(raw).unwrap();
        assert!(plan.done);
        assert!(plan.action.is_finish());

        let raw = r##"{"action": "click", "args": {"selector": "#go"}}"##;
        let plan: Plan = serde_json::from_str(raw).unwrap();
        assert!(!plan.done);
    }

    #[test]
    fn test_plan_missing_action_is_error() {
        let raw = r#"{"thought_summary": "hmm"}"#;
        assert!(serde_json::from_str::<Plan>(raw).is_err());
    }

    #[test]
    fn test_tool_result_constructors() {
        let ok = ToolResult::ok(json!("Navigated"));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ToolResult::failure("Tool teleport not found");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("Tool teleport not found"));
        assert!(failed.output.is_null());
    }

    #[test]
    fn test_session_status_wire_names() {
        assert_eq!(
            serde_json::to_value(SessionStatus::WaitingForInput).unwrap(),
            json!("waiting_for_input")
        );
        assert_eq!(
            serde_json::to_value(SessionStatus::Ready).unwrap(),
            json!("ready")
        );
        assert!(SessionStatus::Completed.is_terminal());
        assert!(!SessionStatus::Running.is_terminal());
    }

    #[test]
    fn test_session_record_schema() {
        let session = Session::new("abc");
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["session_id"], "abc");
        assert_eq!(value["status"], "ready");
        assert!(value["steps"].as_array().unwrap().is_empty());
        assert!(value.get("result").is_none());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_history_entry_shapes() {
        let turn = HistoryEntry::user("search for rust");
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "search for rust");

        let step = HistoryEntry::Step(Step {
            index: 0,
            plan: Plan::no_op(),
            result: ToolResult::ok(Value::Null),
        });
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["index"], 0);
        assert_eq!(value["plan"]["action"], "wait");
    }
}
