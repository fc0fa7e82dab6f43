//! Rendering capability used by the acquisition core.
//!
//! A [`Renderer`] launches isolated browser sessions; a [`Session`] loads one
//! page, exposes its DOM and streams the page's own network responses.
//!
//! # Architecture
//!
//! ```text
//! Renderer::launch_session → Session::on_response → navigate → content → close
//! ```
//!
//! Every session is single-use. The acquisition core opens a fresh one per
//! attempt so that a flagged browser fingerprint never carries over.
//!
//! # Usage
//!
//! ```rust,ignore
//! use fieldscout::scraper::{ChromeRenderer, Renderer, ScraperConfig, WaitCondition};
//!
//! let renderer = ChromeRenderer::new(ScraperConfig::default());
//! let mut session = renderer.launch_session(&options).await?;
//! session.navigate(url, WaitCondition::DomContentLoaded, timeout).await?;
//! let html = session.content().await?;
//! session.close().await?;
//! ```

mod chrome;
mod config;
pub mod scripted;

pub use chrome::ChromeRenderer;
pub use config::{ScraperConfig, DEFAULT_USER_AGENT};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::acquire::InterceptRule;
use crate::app::RenderError;

/// Kind of network resource observed during a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Document,
    Xhr,
    Fetch,
    Script,
    Stylesheet,
    Image,
    Font,
    Media,
    Other,
}

/// Page readiness signal awaited by [`Session::navigate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitCondition {
    #[default]
    DomContentLoaded,
    Load,
}

/// Per-session launch options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub user_agent: Option<String>,
    pub viewport: (u32, u32),
    pub wait: WaitCondition,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            user_agent: None,
            viewport: (1280, 800),
            wait: WaitCondition::default(),
        }
    }
}

/// A response observed by a session, before any parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedResponse {
    pub url: String,
    pub kind: ResourceKind,
    /// Raw body text, or the reason it could not be read.
    pub body: Result<String, String>,
}

/// Responses matching an interception rule, for the lifetime of one session.
///
/// The sender side is owned by the session; the feed ends when it closes.
pub type ResponseFeed = mpsc::UnboundedReceiver<ObservedResponse>;

/// A browser engine able to open isolated rendering sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Launch a fresh session. [`RenderError::Unavailable`] means no session
    /// can be opened at all, so retrying is pointless.
    async fn launch_session(&self, options: &SessionOptions)
        -> Result<Box<dyn Session>, RenderError>;
}

/// One single-page browser session.
#[async_trait]
pub trait Session: Send {
    /// Subscribe to responses matching `rule`. Must be called before
    /// [`Session::navigate`] to observe the page's initial requests.
    async fn on_response(&mut self, rule: InterceptRule) -> Result<ResponseFeed, RenderError>;

    /// Load `url` and wait for `wait`, failing after `timeout`.
    async fn navigate(
        &mut self,
        url: &str,
        wait: WaitCondition,
        timeout: Duration,
    ) -> Result<(), RenderError>;

    /// Serialized markup of the current DOM.
    async fn content(&mut self) -> Result<String, RenderError>;

    /// Tear the session down. Called on every exit path.
    async fn close(self: Box<Self>) -> Result<(), RenderError>;
}

/// Renderer used when browser rendering is disabled.
///
/// Every launch fails with [`RenderError::Unavailable`], which sends requests
/// straight to the non-rendered fallback.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn launch_session(
        &self,
        _options: &SessionOptions,
    ) -> Result<Box<dyn Session>, RenderError> {
        Err(RenderError::Unavailable(
            "browser rendering is disabled".to_string(),
        ))
    }
}
