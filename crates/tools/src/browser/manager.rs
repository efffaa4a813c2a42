//! Browser process lifecycle.
//!
//! Each session run gets its own Chrome process with a throwaway profile,
//! discovered and driven over the CDP debugging endpoint.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;
use uuid::Uuid;
use webpilot_core::config::BrowserConfig;
use webpilot_core::{Error, Paths, Result};

use super::cdp::CdpClient;
use super::page::CdpPage;
use crate::{PageSession, ToolRunner};

pub struct BrowserManager {
    config: BrowserConfig,
    profiles_dir: PathBuf,
}

impl BrowserManager {
    pub fn new(config: BrowserConfig, paths: &Paths) -> Self {
        Self {
            config,
            profiles_dir: paths.browser_dir(),
        }
    }
}

#[async_trait]
impl ToolRunner for BrowserManager {
    async fn open_page(&self) -> Result<Box<dyn PageSession>> {
        let binary = find_chrome_binary()
            .ok_or_else(|| Error::Browser("Chrome not found. Please install it.".to_string()))?;

        let user_data_dir = self.profiles_dir.join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&user_data_dir)?;

        let debug_port = find_free_port().await?;
        let args = build_chrome_args(debug_port, &user_data_dir, &self.config);

        info!(
            port = debug_port,
            headless = self.config.headless,
            "Launching browser"
        );

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Browser(format!("Failed to launch Chrome: {}", e)))?;

        wait_for_cdp_ready(debug_port, 15).await?;
        let page_ws_url = get_page_ws_url(debug_port).await?;

        let cdp = CdpClient::connect(&page_ws_url).await?;
        cdp.enable_domain("Page").await?;
        cdp.enable_domain("Runtime").await?;
        cdp.set_viewport(self.config.viewport_width, self.config.viewport_height)
            .await?;

        info!(ws_url = %page_ws_url, "CDP connection established");
        Ok(Box::new(CdpPage::new(cdp, child, user_data_dir)))
    }
}

fn build_chrome_args(debug_port: u16, user_data_dir: &Path, config: &BrowserConfig) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--metrics-recording-only".to_string(),
        "--password-store=basic".to_string(),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }
    args.push(format!(
        "--window-size={},{}",
        config.viewport_width, config.viewport_height
    ));
    args.push("about:blank".to_string());
    args
}

/// Find a Chrome/Chromium binary on the system.
pub fn find_chrome_binary() -> Option<String> {
    let candidates: Vec<&str> = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    } else {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok() {
            return Some(candidate.to_string());
        }
    }
    None
}

async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Poll /json/version until the debugging endpoint responds.
async fn wait_for_cdp_ready(port: u16, timeout_secs: u64) -> Result<()> {
    let start = std::time::Instant::now();
    let timeout = Duration::from_secs(timeout_secs);
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(Error::Timeout(format!(
                "Chrome CDP not ready after {}s on port {}",
                timeout_secs, port
            )));
        }
        if let Ok(resp) = reqwest::get(&url).await {
            if resp.json::<Value>().await.is_ok() {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Resolve the WebSocket URL of the first page target via /json/list.
/// Retries because the initial tab may not be listed immediately.
async fn get_page_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        let Ok(resp) = reqwest::get(&url).await else {
            continue;
        };
        let Ok(targets) = resp.json::<Vec<Value>>().await else {
            continue;
        };
        for target in &targets {
            if target.get("type").and_then(|v| v.as_str()) == Some("page") {
                if let Some(ws_url) = target.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }
    }
    Err(Error::Browser("No page target found after retries".to_string()))
}
