use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::scraper::{SessionOptions, WaitCondition};

/// Desktop Chrome user agent presented by both browser and plain requests.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Configuration for the browser used by rendering sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Enable browser rendering; when false only plain requests are made (default: true)
    pub enabled: bool,

    /// Whether to run the browser in headless mode (default: true)
    pub headless: bool,

    /// Explicit Chrome/Chromium binary; autodetected when unset
    pub chrome_executable: Option<PathBuf>,

    /// Viewport width in pixels (default: 1280)
    pub window_width: u32,

    /// Viewport height in pixels (default: 800)
    pub window_height: u32,

    /// Page readiness signal to wait for before settling (default: dom_content_loaded)
    pub wait_until: WaitCondition,

    /// User agent string to use
    pub user_agent: Option<String>,

    /// Extra command-line switches passed to the browser
    pub extra_args: Vec<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: true,
            chrome_executable: None,
            window_width: 1280,
            window_height: 800,
            wait_until: WaitCondition::DomContentLoaded,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            extra_args: Vec::new(),
        }
    }
}

impl ScraperConfig {
    /// Switches every session is launched with.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--no-sandbox",
            "--disable-setuid-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        for arg in &self.extra_args {
            if !args.contains(arg) {
                args.push(arg.clone());
            }
        }
        args
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            user_agent: self.user_agent.clone(),
            viewport: (self.window_width, self.window_height),
            wait: self.wait_until,
        }
    }
}
