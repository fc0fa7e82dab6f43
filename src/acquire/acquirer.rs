use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::acquire::backoff::{BackoffPolicy, FailureKind, Pause, Sleeper, TokioSleeper};
use crate::acquire::block::Verdict;
use crate::acquire::gate::{ConcurrencyGate, GatePermit};
use crate::acquire::intercept::{payload_is_usable, Interceptor};
use crate::app::{AcquireError, RenderError};
use crate::domain::{
    Acquired, AttemptOutcome, DirectEndpoint, FetchAttempt, FetchRequest, Payload, Strategy,
};
use crate::fetcher::Fetcher;
use crate::scraper::{Renderer, Session, SessionOptions};

/// Why a single render attempt produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptFailure {
    Blocked(String),
    Transport(String),
    Timeout(String),
    /// No session can be opened at all.
    Unavailable(String),
    /// The request's overall deadline passed mid-attempt.
    DeadlineExceeded,
}

impl AttemptFailure {
    fn from_launch(err: RenderError) -> Self {
        match err {
            RenderError::Unavailable(cause) => AttemptFailure::Unavailable(cause),
            RenderError::Timeout(_) => AttemptFailure::Timeout(err.to_string()),
            other => AttemptFailure::Transport(other.to_string()),
        }
    }

    fn from_navigation(err: RenderError) -> Self {
        match err {
            RenderError::Timeout(_) => AttemptFailure::Timeout(err.to_string()),
            RenderError::Unavailable(cause) => AttemptFailure::Unavailable(cause),
            other => AttemptFailure::Transport(other.to_string()),
        }
    }

    fn outcome(&self) -> AttemptOutcome {
        match self {
            AttemptFailure::Blocked(signature) => AttemptOutcome::Blocked(signature.clone()),
            AttemptFailure::Transport(cause) | AttemptFailure::Unavailable(cause) => {
                AttemptOutcome::TransportError(cause.clone())
            }
            AttemptFailure::Timeout(cause) => AttemptOutcome::Timeout(cause.clone()),
            AttemptFailure::DeadlineExceeded => {
                AttemptOutcome::Timeout("request deadline exceeded".to_string())
            }
        }
    }

    fn backoff_kind(&self) -> FailureKind {
        match self {
            AttemptFailure::Blocked(_) => FailureKind::Blocked,
            _ => FailureKind::Error,
        }
    }

    fn into_error(self, attempts: u32) -> AcquireError {
        match self {
            AttemptFailure::Blocked(signature) => AcquireError::Blocked {
                attempts,
                signature,
            },
            AttemptFailure::Transport(cause) | AttemptFailure::Unavailable(cause) => {
                AcquireError::Transport { attempts, cause }
            }
            AttemptFailure::Timeout(cause) => AcquireError::Timeout { attempts, cause },
            AttemptFailure::DeadlineExceeded => AcquireError::Timeout {
                attempts,
                cause: "request deadline exceeded".to_string(),
            },
        }
    }
}

/// Time left before `deadline`, or `None` when there is no deadline.
fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|at| at.saturating_duration_since(Instant::now()))
}

fn expired(deadline: Option<Instant>) -> bool {
    remaining(deadline).is_some_and(|left| left.is_zero())
}

/// Run `fut` to completion, or give up at `deadline`.
async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Runs the multi-strategy fetch protocol.
///
/// Strategies are tried in priority order and the first usable payload wins:
/// direct endpoint, render with interception, render and read the DOM, then a
/// single plain GET. Render attempts are retried with linear backoff; each
/// one opens a fresh session while holding a gate permit.
pub struct Acquirer {
    renderer: Arc<dyn Renderer>,
    fetcher: Arc<dyn Fetcher>,
    gate: ConcurrencyGate,
    backoff: BackoffPolicy,
    sleeper: Arc<dyn Sleeper>,
    session_options: SessionOptions,
}

impl Acquirer {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        fetcher: Arc<dyn Fetcher>,
        gate: ConcurrencyGate,
    ) -> Self {
        Self {
            renderer,
            fetcher,
            gate,
            backoff: BackoffPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            session_options: SessionOptions::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.session_options = options;
        self
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub async fn acquire(&self, request: &FetchRequest) -> Result<Acquired, AcquireError> {
        let deadline = request.deadline.map(|d| Instant::now() + d);
        let mut attempts: Vec<FetchAttempt> = Vec::new();

        info!(url = %request.url, strategy = ?request.strategy, "Acquiring");

        if let Some(endpoint) = request.direct_endpoint() {
            match self.fetch_direct(request, endpoint, deadline).await {
                Ok(value) => {
                    info!(url = %request.url, endpoint = %endpoint.url, "Direct endpoint returned data");
                    return Ok(Acquired {
                        payload: Payload::Structured(value),
                        strategy: Strategy::Direct,
                        attempts,
                    });
                }
                Err(e) => {
                    warn!(endpoint = %endpoint.url, error = %e, "Direct endpoint unusable, rendering instead");
                }
            }
        }

        let mut last_cause: Option<AcquireError> = None;

        for index in 1..=request.attempts {
            let permit = match self.admit(index, deadline).await {
                Ok(permit) => permit,
                Err(e) if index == 1 => {
                    warn!(url = %request.url, in_use = self.gate.in_use(), "Rendering capacity exhausted");
                    return Err(e);
                }
                Err(e) => {
                    last_cause = Some(e);
                    break;
                }
            };

            let started = Instant::now();
            let result = self.attempt(request, deadline).await;
            permit.release();
            let elapsed = started.elapsed();

            let failure = match result {
                Ok((payload, strategy)) => {
                    attempts.push(FetchAttempt {
                        index,
                        outcome: AttemptOutcome::Success(strategy),
                        elapsed,
                    });
                    info!(url = %request.url, attempt = index, strategy = %strategy, "Acquired");
                    return Ok(Acquired {
                        payload,
                        strategy,
                        attempts,
                    });
                }
                Err(failure) => failure,
            };

            warn!(
                url = %request.url,
                attempt = index,
                budget = request.attempts,
                outcome = ?failure.outcome(),
                "Render attempt failed"
            );
            attempts.push(FetchAttempt {
                index,
                outcome: failure.outcome(),
                elapsed,
            });

            let stop = matches!(
                failure,
                AttemptFailure::Unavailable(_) | AttemptFailure::DeadlineExceeded
            );
            let kind = failure.backoff_kind();
            last_cause = Some(failure.into_error(index));

            if stop || index == request.attempts {
                break;
            }

            let delay = self.backoff.delay(index, kind);
            if remaining(deadline).is_some_and(|left| left <= delay) {
                last_cause = Some(AcquireError::Timeout {
                    attempts: index,
                    cause: "request deadline exceeded".to_string(),
                });
                break;
            }
            debug!(attempt = index, delay_ms = delay.as_millis() as u64, "Backing off");
            self.sleeper.sleep(Pause::Backoff, delay).await;
        }

        if request.fallback && !expired(deadline) {
            match self.fetch_fallback(request, deadline).await {
                Ok(markup) => {
                    info!(url = %request.url, "Acquired via plain request");
                    return Ok(Acquired {
                        payload: Payload::Markup(markup),
                        strategy: Strategy::Fallback,
                        attempts,
                    });
                }
                Err(e) => warn!(url = %request.url, error = %e, "Plain request fallback failed"),
            }
        }

        Err(last_cause.unwrap_or_else(|| AcquireError::Transport {
            attempts: attempts.len() as u32,
            cause: "no strategy produced a payload".to_string(),
        }))
    }

    /// The configured gate mode governs the first attempt; retries of an
    /// admitted request wait for a slot.
    async fn admit(&self, index: u32, deadline: Option<Instant>) -> Result<GatePermit, AcquireError> {
        if index == 1 {
            return self.gate.acquire_within(remaining(deadline)).await;
        }
        let wait = remaining(deadline).unwrap_or_else(|| self.gate.wait_timeout());
        self.gate.acquire_wait(wait).await
    }

    /// One render attempt. The session is closed on every path.
    async fn attempt(
        &self,
        request: &FetchRequest,
        deadline: Option<Instant>,
    ) -> Result<(Payload, Strategy), AttemptFailure> {
        let launch = self.renderer.launch_session(&self.session_options);
        let mut session = match within(deadline, launch).await {
            Some(Ok(session)) => session,
            Some(Err(e)) => return Err(AttemptFailure::from_launch(e)),
            None => return Err(AttemptFailure::DeadlineExceeded),
        };

        let result = within(deadline, self.drive(session.as_mut(), request))
            .await
            .unwrap_or(Err(AttemptFailure::DeadlineExceeded));

        if let Err(e) = session.close().await {
            warn!(url = %request.url, error = %e, "Failed to close rendering session");
        }

        result
    }

    async fn drive(
        &self,
        session: &mut dyn Session,
        request: &FetchRequest,
    ) -> Result<(Payload, Strategy), AttemptFailure> {
        let interceptor = match request.intercept_rule() {
            Some(rule) => match session.on_response(rule.clone()).await {
                Ok(feed) => Some(Interceptor::new(feed, request.capture, request.accept_empty)),
                Err(e) => {
                    warn!(url = %request.url, error = %e, "Response interception unavailable");
                    None
                }
            },
            None => None,
        };

        session
            .navigate(&request.url, self.session_options.wait, request.timeout)
            .await
            .map_err(AttemptFailure::from_navigation)?;

        let settle = request.settle.sample();
        debug!(url = %request.url, settle_ms = settle.as_millis() as u64, "Settling");
        self.sleeper.sleep(Pause::Settle, settle).await;

        if let Some(interceptor) = interceptor {
            if let Some(value) = interceptor.take_payload() {
                return Ok((Payload::Structured(value), Strategy::Intercept));
            }
            debug!(url = %request.url, "No usable payload intercepted, reading DOM");
        }

        let markup = session
            .content()
            .await
            .map_err(|e| AttemptFailure::Transport(e.to_string()))?;

        if markup.trim().is_empty() {
            return Err(AttemptFailure::Transport(
                "rendered document is empty".to_string(),
            ));
        }

        match request.detector.classify(&markup) {
            Verdict::Blocked(signature) => Err(AttemptFailure::Blocked(signature)),
            Verdict::Usable => Ok((Payload::Markup(markup), Strategy::Render)),
        }
    }

    async fn fetch_direct(
        &self,
        request: &FetchRequest,
        endpoint: &DirectEndpoint,
        deadline: Option<Instant>,
    ) -> Result<Value, AcquireError> {
        let page = within(deadline, self.fetcher.fetch(&endpoint.url))
            .await
            .ok_or_else(|| AcquireError::Timeout {
                attempts: 0,
                cause: "request deadline exceeded".to_string(),
            })?
            .map_err(|e| AcquireError::Transport {
                attempts: 0,
                cause: e.to_string(),
            })?;

        let value: Value =
            serde_json::from_str(&page.body).map_err(|e| AcquireError::Parse(e.to_string()))?;

        if !payload_is_usable(&value, endpoint.expect.as_deref(), request.accept_empty) {
            return Err(AcquireError::Parse(format!(
                "expected structure {} is missing or empty",
                endpoint.expect.as_deref().unwrap_or("/")
            )));
        }

        Ok(value)
    }

    async fn fetch_fallback(
        &self,
        request: &FetchRequest,
        deadline: Option<Instant>,
    ) -> Result<String, AcquireError> {
        let page = within(deadline, self.fetcher.fetch(&request.url))
            .await
            .ok_or_else(|| AcquireError::Timeout {
                attempts: 1,
                cause: "request deadline exceeded".to_string(),
            })?
            .map_err(|e| AcquireError::Transport {
                attempts: 1,
                cause: e.to_string(),
            })?;

        if page.body.trim().is_empty() {
            return Err(AcquireError::Transport {
                attempts: 1,
                cause: "empty response body".to_string(),
            });
        }

        match request.detector.classify(&page.body) {
            Verdict::Blocked(signature) => Err(AcquireError::Blocked {
                attempts: 1,
                signature,
            }),
            Verdict::Usable => Ok(page.body),
        }
    }
}
