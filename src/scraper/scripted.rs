//! Scripted renderer for exercising the acquisition core without a browser.
//!
//! Each launched session consumes the next [`SessionScript`]; once the queue is
//! empty the fallback script repeats. Counters record how many sessions were
//! launched, opened, closed and are still alive.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use crate::acquire::InterceptRule;
use crate::app::RenderError;
use crate::scraper::{
    ObservedResponse, Renderer, ResourceKind, ResponseFeed, Session, SessionOptions,
    WaitCondition,
};

/// How a scripted navigation behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigateStep {
    Ok,
    Fail(String),
    /// Never loads; reports a timeout once the navigation timeout elapses.
    Stall,
}

/// Behaviour of one scripted session.
#[derive(Debug, Clone)]
pub struct SessionScript {
    launch: Option<RenderError>,
    navigate: NavigateStep,
    responses: Vec<ObservedResponse>,
    content: Result<String, String>,
    close_fails: bool,
    hold: Option<Arc<Semaphore>>,
}

impl SessionScript {
    /// Navigation succeeds and the DOM reads as `html`.
    pub fn markup(html: &str) -> Self {
        Self {
            launch: None,
            navigate: NavigateStep::Ok,
            responses: Vec::new(),
            content: Ok(html.to_string()),
            close_fails: false,
            hold: None,
        }
    }

    /// A typical anti-bot interstitial served with a 200.
    pub fn blocked() -> Self {
        Self::markup("<html><body><h1>Access Denied</h1><div class=\"captcha\"></div></body></html>")
    }

    /// The page issues an XHR to `url` returning `body`.
    pub fn captured(url: &str, body: &str) -> Self {
        Self::markup("<html><body><div id=\"app\"></div></body></html>").with_response(
            url,
            ResourceKind::Xhr,
            Ok(body.to_string()),
        )
    }

    pub fn launch_failure(message: &str) -> Self {
        Self {
            launch: Some(RenderError::Session(message.to_string())),
            ..Self::markup("")
        }
    }

    pub fn unavailable() -> Self {
        Self {
            launch: Some(RenderError::Unavailable("no browser".to_string())),
            ..Self::markup("")
        }
    }

    pub fn navigate_failure(message: &str) -> Self {
        Self {
            navigate: NavigateStep::Fail(message.to_string()),
            ..Self::markup("")
        }
    }

    pub fn stall() -> Self {
        Self {
            navigate: NavigateStep::Stall,
            ..Self::markup("")
        }
    }

    pub fn content_failure(message: &str) -> Self {
        Self {
            content: Err(message.to_string()),
            ..Self::markup("")
        }
    }

    pub fn with_response(
        mut self,
        url: &str,
        kind: ResourceKind,
        body: Result<String, String>,
    ) -> Self {
        self.responses.push(ObservedResponse {
            url: url.to_string(),
            kind,
            body,
        });
        self
    }

    /// `close()` reports an error (the session still counts as closed).
    pub fn failing_close(mut self) -> Self {
        self.close_fails = true;
        self
    }

    /// Navigation waits for a permit from `hold` before completing.
    pub fn held_by(mut self, hold: Arc<Semaphore>) -> Self {
        self.hold = Some(hold);
        self
    }
}

#[derive(Default)]
struct Counters {
    launches: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    live: AtomicUsize,
}

pub struct ScriptedRenderer {
    scripts: Mutex<VecDeque<SessionScript>>,
    fallback: SessionScript,
    counters: Arc<Counters>,
    navigations: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRenderer {
    /// Every session follows `script`.
    pub fn repeating(script: SessionScript) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            fallback: script,
            counters: Arc::new(Counters::default()),
            navigations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sessions follow `scripts` in order, then repeat the last one.
    pub fn sequence(scripts: Vec<SessionScript>) -> Self {
        let fallback = scripts
            .last()
            .cloned()
            .unwrap_or_else(|| SessionScript::markup("<html></html>"));
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::repeating(fallback)
        }
    }

    pub fn launches(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Sessions not yet dropped.
    pub fn sessions_live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_script(&self) -> SessionScript {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn launch_session(
        &self,
        _options: &SessionOptions,
    ) -> Result<Box<dyn Session>, RenderError> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        let script = self.next_script();

        if let Some(err) = script.launch.clone() {
            return Err(err);
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedSession {
            script,
            feed: None,
            counters: self.counters.clone(),
            navigations: self.navigations.clone(),
        }))
    }
}

struct ScriptedSession {
    script: SessionScript,
    feed: Option<(InterceptRule, mpsc::UnboundedSender<ObservedResponse>)>,
    counters: Arc<Counters>,
    navigations: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn on_response(&mut self, rule: InterceptRule) -> Result<ResponseFeed, RenderError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feed = Some((rule, tx));
        Ok(rx)
    }

    async fn navigate(
        &mut self,
        url: &str,
        _wait: WaitCondition,
        timeout: Duration,
    ) -> Result<(), RenderError> {
        self.navigations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        if let Some(ref hold) = self.script.hold {
            if let Ok(permit) = hold.acquire().await {
                permit.forget();
            }
        }

        match self.script.navigate {
            NavigateStep::Ok => {}
            NavigateStep::Fail(ref message) => {
                return Err(RenderError::Navigation(message.clone()));
            }
            NavigateStep::Stall => {
                tokio::time::sleep(timeout).await;
                return Err(RenderError::Timeout(timeout));
            }
        }

        if let Some((ref rule, ref tx)) = self.feed {
            for response in &self.script.responses {
                if rule.matches(&response.url, response.kind) {
                    let _ = tx.send(response.clone());
                }
            }
        }

        Ok(())
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        self.script.content.clone().map_err(RenderError::Session)
    }

    async fn close(self: Box<Self>) -> Result<(), RenderError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        if self.script.close_fails {
            return Err(RenderError::Session("browser refused to exit".to_string()));
        }
        Ok(())
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}
