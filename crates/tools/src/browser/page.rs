//! Action execution against a live CDP page.

use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::time::Instant;
use tokio::process::Child;
use tracing::{debug, info, warn};
use webpilot_core::types::{Action, ToolResult};
use webpilot_core::Result;

use super::cdp::CdpClient;
use crate::PageSession;

/// Page text beyond this many characters is cut before it reaches the
/// planner prompt.
const MAX_PAGE_TEXT_CHARS: usize = 10_000;
const SCREENSHOT_QUALITY: u32 = 50;

pub struct CdpPage {
    cdp: CdpClient,
    process: Child,
    user_data_dir: PathBuf,
    current_url: String,
}

impl CdpPage {
    pub fn new(cdp: CdpClient, process: Child, user_data_dir: PathBuf) -> Self {
        Self {
            cdp,
            process,
            user_data_dir,
            current_url: "about:blank".to_string(),
        }
    }

    async fn run_action(&mut self, action: &Action) -> ToolResult {
        match action {
            Action::OpenUrl { url } => match self.cdp.navigate(url).await {
                Ok(_) => {
                    self.current_url = url.clone();
                    ToolResult::ok(json!(format!("Navigated to {}", url)))
                }
                Err(e) => ToolResult::failure(e.to_string()),
            },
            Action::Click { selector } => {
                match self.cdp.evaluate_js(&click_js(selector)).await {
                    Ok(_) => ToolResult::ok(json!(format!("Clicked {}", selector))),
                    Err(e) => ToolResult::failure(e.to_string()),
                }
            }
            Action::TypeText { selector, text } => {
                match self.cdp.evaluate_js(&fill_js(selector, text)).await {
                    Ok(_) => ToolResult::ok(json!(format!("Typed text into {}", selector))),
                    Err(e) => ToolResult::failure(e.to_string()),
                }
            }
            Action::GetPageText => {
                match self.cdp.evaluate_js("document.body.innerText").await {
                    Ok(value) => {
                        let text = value.as_str().unwrap_or_default();
                        ToolResult::ok(json!(truncate_chars(text, MAX_PAGE_TEXT_CHARS)))
                    }
                    Err(e) => ToolResult::failure(e.to_string()),
                }
            }
            Action::GetScreenshot => match self.cdp.screenshot_jpeg(SCREENSHOT_QUALITY).await {
                Ok(data) => {
                    let mut result = ToolResult::ok(json!("Screenshot taken"));
                    result.screenshot = Some(data);
                    result
                }
                Err(e) => ToolResult::failure(e.to_string()),
            },
            // Genuine no-op: the loop advances one tick without touching the page.
            Action::Wait => ToolResult::ok(json!("Waited")),
            Action::Finish { final_answer } => ToolResult::ok(json!(final_answer.clone())),
            Action::Unknown(name) => ToolResult::failure(format!("Tool {} not found", name)),
        }
    }
}

#[async_trait]
impl PageSession for CdpPage {
    fn current_url(&self) -> String {
        self.current_url.clone()
    }

    async fn execute(&mut self, action: &Action) -> ToolResult {
        let started = Instant::now();
        debug!(tool = action.name(), "Executing tool");

        let mut result = self.run_action(action).await;

        // Best-effort failure screenshot so the viewer sees what went wrong.
        if !result.success && result.screenshot.is_none() {
            match self.screenshot().await {
                Ok(data) => result.screenshot = Some(data),
                Err(e) => debug!("Failure screenshot unavailable: {}", e),
            }
        }

        result.execution_time = started.elapsed().as_secs_f64();
        info!(
            tool = action.name(),
            success = result.success,
            duration = result.execution_time,
            "Tool executed"
        );
        result
    }

    async fn screenshot(&self) -> Result<String> {
        self.cdp.screenshot_jpeg(SCREENSHOT_QUALITY).await
    }

    async fn close(&mut self) {
        self.cdp.close_browser().await;
        let _ = self.process.kill().await;
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            warn!("Failed to remove browser profile: {}", e);
        }
    }
}

/// Embed a string into generated JavaScript as a quoted literal.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn click_js(selector: &str) -> String {
    let sel = js_string(selector);
    format!(
        "(() => {{ const el = document.querySelector({sel}); \
         if (!el) throw new Error('No element matches selector: ' + {sel}); \
         el.click(); return true; }})()"
    )
}

/// Set the value directly and fire input/change so framework-bound inputs
/// observe the edit, mirroring a form fill rather than keystrokes.
fn fill_js(selector: &str, text: &str) -> String {
    let sel = js_string(selector);
    let val = js_string(text);
    format!(
        "(() => {{ const el = document.querySelector({sel}); \
         if (!el) throw new Error('No element matches selector: ' + {sel}); \
         el.focus(); el.value = {val}; \
         el.dispatchEvent(new Event('input', {{bubbles: true}})); \
         el.dispatchEvent(new Event('change', {{bubbles: true}})); \
         return true; }})()"
    )
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
