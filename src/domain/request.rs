use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::acquire::{BlockDetector, CapturePolicy, InterceptRule};

/// Caller's preferred acquisition strategy.
///
/// The hint picks where the protocol starts; lower-priority strategies are
/// still tried as fallbacks. The default starts at the top, so a configured
/// direct endpoint is used when present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyHint {
    #[default]
    DirectApi,
    /// Skip the direct endpoint.
    RenderIntercept,
    /// Skip the direct endpoint and interception.
    RenderRead,
}

impl FromStr for StrategyHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "direct-api" | "api" => Ok(StrategyHint::DirectApi),
            "intercept" | "render-intercept" => Ok(StrategyHint::RenderIntercept),
            "read" | "render" | "render-read" => Ok(StrategyHint::RenderRead),
            other => Err(format!(
                "Unknown strategy: {}. Use 'direct-api', 'render-intercept' or 'render-read'",
                other
            )),
        }
    }
}

impl fmt::Display for StrategyHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyHint::DirectApi => "direct-api",
            StrategyHint::RenderIntercept => "render-intercept",
            StrategyHint::RenderRead => "render-read",
        };
        f.write_str(name)
    }
}

/// Strategy that actually produced a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Direct,
    Intercept,
    Render,
    Fallback,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Direct => "direct",
            Strategy::Intercept => "intercept",
            Strategy::Render => "render",
            Strategy::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Post-load pause, sampled uniformly from `min..=max` per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleWindow {
    pub min: Duration,
    pub max: Duration,
}

impl SettleWindow {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Stable data endpoint that can be queried without rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectEndpoint {
    pub url: String,
    /// JSON pointer to the structure that must be present and non-empty.
    #[serde(default)]
    pub expect: Option<String>,
}

/// One acquisition request. Built once, then only read.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub strategy: StrategyHint,
    pub attempts: u32,
    pub timeout: Duration,
    pub settle: SettleWindow,
    pub detector: Arc<BlockDetector>,
    pub direct: Option<DirectEndpoint>,
    pub intercept: Option<InterceptRule>,
    pub capture: CapturePolicy,
    pub accept_empty: bool,
    pub fallback: bool,
    pub deadline: Option<Duration>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            strategy: StrategyHint::default(),
            attempts: 3,
            timeout: Duration::from_secs(60),
            settle: SettleWindow::fixed(Duration::from_millis(3000)),
            detector: Arc::new(BlockDetector::default()),
            direct: None,
            intercept: None,
            capture: CapturePolicy::default(),
            accept_empty: false,
            fallback: true,
            deadline: None,
        }
    }

    pub fn with_strategy(mut self, strategy: StrategyHint) -> Self {
        self.strategy = strategy;
        self
    }

    /// Attempt budget; clamped to at least one attempt.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_settle(mut self, settle: SettleWindow) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_detector(mut self, detector: Arc<BlockDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_direct(mut self, direct: Option<DirectEndpoint>) -> Self {
        self.direct = direct;
        self
    }

    pub fn with_intercept(mut self, rule: Option<InterceptRule>) -> Self {
        self.intercept = rule;
        self
    }

    pub fn with_capture(mut self, capture: CapturePolicy) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_accept_empty(mut self, accept_empty: bool) -> Self {
        self.accept_empty = accept_empty;
        self
    }

    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// The direct endpoint, unless the caller asked to start at rendering.
    pub fn direct_endpoint(&self) -> Option<&DirectEndpoint> {
        match self.strategy {
            StrategyHint::DirectApi => self.direct.as_ref(),
            StrategyHint::RenderIntercept | StrategyHint::RenderRead => None,
        }
    }

    /// The interception rule, unless the caller asked for a plain DOM read.
    pub fn intercept_rule(&self) -> Option<&InterceptRule> {
        match self.strategy {
            StrategyHint::RenderRead => None,
            _ => self.intercept.as_ref(),
        }
    }
}

/// Outcome of a single rendering attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(Strategy),
    Blocked(String),
    TransportError(String),
    Timeout(String),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    /// 1-based attempt index.
    pub index: u32,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Markup(String),
    Structured(serde_json::Value),
}

/// Successful terminal result of a fetch request.
#[derive(Debug, Clone)]
pub struct Acquired {
    pub payload: Payload,
    pub strategy: Strategy,
    pub attempts: Vec<FetchAttempt>,
}
