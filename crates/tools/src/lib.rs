pub mod browser;

use async_trait::async_trait;
use webpilot_core::types::{Action, ToolResult};
use webpilot_core::Result;

pub use browser::manager::BrowserManager;

/// One live page a session run acts against.
#[async_trait]
pub trait PageSession: Send {
    fn current_url(&self) -> String;

    /// Execute one action. Infallible by contract: every outcome, including
    /// unknown actions and page errors, is folded into the returned
    /// [`ToolResult`] so the run loop never aborts on a bad action.
    async fn execute(&mut self, action: &Action) -> ToolResult;

    /// Base64-encoded JPEG of the current viewport.
    async fn screenshot(&self) -> Result<String>;

    async fn close(&mut self);
}

/// Opens fresh pages for session runs.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn open_page(&self) -> Result<Box<dyn PageSession>>;
}
