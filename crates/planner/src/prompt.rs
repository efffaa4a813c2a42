//! Planner prompt assembly.

use webpilot_core::types::{ChatMessage, HistoryEntry};

const PLANNER_PROMPT: &str = r#"You are an autonomous browser agent. Your goal is to complete the user's task: "{task}"

You must output a JSON object with the following structure:
{
    "thought_summary": "Short reasoning about the current state and what to do next",
    "action": "Name of the tool to execute (open_url, click, type_text, get_page_text, get_screenshot, finish)",
    "args": { ... arguments for the tool ... },
    "confidence": 0.9,
    "done": false
}

If the task is complete, set "action" to "finish", "done" to true, and put your final answer in "args": { "final_answer": "..." }.

Available Tools:
- open_url(url: str)
- click(selector: str)
- type_text(selector: str, text: str)
- get_page_text()
- get_screenshot()

Current Browser Context:
{context}

Previous Steps:
{history}
"#;

/// Build the chat-completion messages for one planning call. Only the most
/// recent `window` history entries are serialized to bound prompt growth.
pub fn build_messages(
    task: &str,
    history: &[HistoryEntry],
    observation: &str,
    window: usize,
) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(window);
    let recent = serde_json::to_string(&history[start..]).unwrap_or_else(|_| "[]".to_string());

    let system = PLANNER_PROMPT
        .replace("{task}", task)
        .replace("{context}", observation)
        .replace("{history}", &recent);

    vec![
        ChatMessage::system(&system),
        ChatMessage::user("What is the next step?"),
    ]
}
