use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFinished, EventResponseReceived, GetResponseBodyParams, RequestId, ResourceType,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::acquire::InterceptRule;
use crate::app::RenderError;
use crate::scraper::config::ScraperConfig;
use crate::scraper::{
    ObservedResponse, Renderer, ResourceKind, ResponseFeed, Session, SessionOptions,
    WaitCondition,
};

/// Chrome-based renderer using chromiumoxide.
///
/// Each session is a separate browser process, so no cookies, cache or
/// fingerprint survive from one attempt to the next.
pub struct ChromeRenderer {
    config: ScraperConfig,
}

impl ChromeRenderer {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }

    fn browser_config(&self, options: &SessionOptions) -> Result<BrowserConfig, RenderError> {
        let (width, height) = options.viewport;
        let mut builder = BrowserConfig::builder().window_size(width, height);

        for arg in self.config.launch_args() {
            builder = builder.arg(arg);
        }

        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(ref path) = self.config.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|e| RenderError::Unavailable(format!("Failed to build browser config: {}", e)))
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn launch_session(
        &self,
        options: &SessionOptions,
    ) -> Result<Box<dyn Session>, RenderError> {
        let browser_config = self.browser_config(options)?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            RenderError::Unavailable(format!(
                "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                e
            ))
        })?;

        // Spawn the browser handler
        let handler_task = tokio::spawn(async move {
            while let Some(_event) = handler.next().await {
                // Handle browser events
            }
        });

        let page = match open_page(&browser, options).await {
            Ok(page) => page,
            Err(e) => {
                let mut browser = browser;
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                return Err(e);
            }
        };

        debug!("Browser session launched");

        Ok(Box::new(ChromeSession {
            browser,
            page,
            handler_task,
            intercept_task: None,
        }))
    }
}

async fn open_page(browser: &Browser, options: &SessionOptions) -> Result<Page, RenderError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| RenderError::Session(format!("Failed to create page: {}", e)))?;

    // Set user agent if configured
    if let Some(ref ua) = options.user_agent {
        page.set_user_agent(ua)
            .await
            .map_err(|e| RenderError::Session(format!("Failed to set user agent: {}", e)))?;
    }

    Ok(page)
}

/// One browser process with a single page.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    intercept_task: Option<JoinHandle<()>>,
}

#[async_trait]
impl Session for ChromeSession {
    async fn on_response(&mut self, rule: InterceptRule) -> Result<ResponseFeed, RenderError> {
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| RenderError::Session(format!("Failed to observe responses: {}", e)))?;
        let mut finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|e| RenderError::Session(format!("Failed to observe responses: {}", e)))?;

        let page = self.page.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        // Bodies are only complete once loading finished, so matching
        // responses wait in `pending` until then.
        let task = tokio::spawn(async move {
            let mut pending: HashMap<String, (RequestId, String, ResourceKind)> = HashMap::new();

            loop {
                tokio::select! {
                    Some(event) = responses.next() => {
                        let kind = resource_kind(&event.r#type);
                        if rule.matches(&event.response.url, kind) {
                            pending.insert(
                                event.request_id.inner().clone(),
                                (event.request_id.clone(), event.response.url.clone(), kind),
                            );
                        }
                    }
                    Some(event) = finished.next() => {
                        let Some((request_id, url, kind)) = pending.remove(event.request_id.inner()) else {
                            continue;
                        };
                        let body = read_body(&page, request_id).await;
                        if tx.send(ObservedResponse { url, kind, body }).is_err() {
                            break;
                        }
                    }
                    else => break,
                }
            }
        });

        if let Some(previous) = self.intercept_task.replace(task) {
            previous.abort();
        }

        Ok(rx)
    }

    async fn navigate(
        &mut self,
        url: &str,
        wait: WaitCondition,
        timeout: Duration,
    ) -> Result<(), RenderError> {
        let page = &self.page;
        let load = async {
            page.goto(url)
                .await
                .map_err(|e| RenderError::Navigation(e.to_string()))?;

            if wait == WaitCondition::Load {
                page.wait_for_navigation()
                    .await
                    .map_err(|e| RenderError::Navigation(e.to_string()))?;
            }

            Ok(())
        };

        match tokio::time::timeout(timeout, load).await {
            Ok(result) => result,
            Err(_) => Err(RenderError::Timeout(timeout)),
        }
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        self.page
            .content()
            .await
            .map_err(|e| RenderError::Session(format!("Failed to read content: {}", e)))
    }

    async fn close(self: Box<Self>) -> Result<(), RenderError> {
        let mut session = *self;

        if let Some(task) = session.intercept_task.take() {
            task.abort();
        }

        let result = session
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| RenderError::Session(format!("Failed to close browser: {}", e)));
        let _ = session.browser.wait().await;
        session.handler_task.abort();

        debug!("Browser session closed");
        result
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        // Browser's own Drop kills the process; the tasks would otherwise linger.
        if let Some(task) = self.intercept_task.take() {
            task.abort();
        }
        self.handler_task.abort();
    }
}

async fn read_body(page: &Page, request_id: RequestId) -> Result<String, String> {
    let response = page
        .execute(GetResponseBodyParams::new(request_id))
        .await
        .map_err(|e| e.to_string())?;

    let body = &response.result;
    if body.base64_encoded {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&body.body)
            .map_err(|e| e.to_string())?;
        String::from_utf8(bytes).map_err(|e| e.to_string())
    } else {
        Ok(body.body.clone())
    }
}

fn resource_kind(kind: &ResourceType) -> ResourceKind {
    match kind {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Xhr => ResourceKind::Xhr,
        ResourceType::Fetch => ResourceKind::Fetch,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Media => ResourceKind::Media,
        _ => ResourceKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_mapping() {
        assert_eq!(resource_kind(&ResourceType::Xhr), ResourceKind::Xhr);
        assert_eq!(resource_kind(&ResourceType::Fetch), ResourceKind::Fetch);
        assert_eq!(resource_kind(&ResourceType::Document), ResourceKind::Document);
        assert_eq!(resource_kind(&ResourceType::WebSocket), ResourceKind::Other);
    }

    #[tokio::test]
    #[ignore] // Requires Chrome or Chromium to be installed
    async fn test_chrome_session_reads_markup() {
        let renderer = ChromeRenderer::new(ScraperConfig::default());
        let mut session = renderer
            .launch_session(&SessionOptions::default())
            .await
            .expect("failed to launch session");

        session
            .navigate(
                "data:text/html,<h1>Hello</h1><p>World</p>",
                WaitCondition::DomContentLoaded,
                Duration::from_secs(10),
            )
            .await
            .expect("navigation failed");

        let html = session.content().await.expect("content failed");
        assert!(html.contains("<h1>Hello</h1>"));

        session.close().await.expect("close failed");
    }
}
