use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Why the acquisition core is pausing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// Letting a rendered page finish its background requests.
    Settle,
    /// Waiting out a failed attempt before the next one.
    Backoff,
}

/// Source of delays, injectable so tests never sleep for real.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, pause: Pause, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, _pause: Pause, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and remembers every requested pause.
#[derive(Default)]
pub struct RecordingSleeper {
    pauses: Mutex<Vec<(Pause, Duration)>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backoffs(&self) -> Vec<Duration> {
        self.pauses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(pause, _)| *pause == Pause::Backoff)
            .map(|(_, d)| *d)
            .collect()
    }

    pub fn settles(&self) -> usize {
        self.pauses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(pause, _)| *pause == Pause::Settle)
            .count()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, pause: Pause, duration: Duration) {
        self.pauses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((pause, duration));
    }
}

/// What the failed attempt ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Blocked,
    Error,
}

/// Linear backoff between render attempts.
///
/// The delay after attempt `n` is `base * n` plus up to `jitter` of random
/// slack. Blocked pages back off longer than plain errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub blocked_base: Duration,
    pub error_base: Duration,
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            blocked_base: Duration::from_millis(2000),
            error_base: Duration::from_millis(1500),
            jitter: Duration::ZERO,
        }
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            blocked_base: Duration::from_millis(config.blocked_base_ms),
            error_base: Duration::from_millis(config.error_base_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    pub fn delay(&self, attempt: u32, kind: FailureKind) -> Duration {
        let base = match kind {
            FailureKind::Blocked => self.blocked_base,
            FailureKind::Error => self.error_base,
        };
        base * attempt.max(1) + self.sample_jitter()
    }

    fn sample_jitter(&self) -> Duration {
        let max = self.jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

/// Retry backoff configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Base delay after a blocked attempt, in milliseconds (default: 2000)
    pub blocked_base_ms: u64,

    /// Base delay after a failed attempt, in milliseconds (default: 1500)
    pub error_base_ms: u64,

    /// Maximum random slack added to each delay, in milliseconds (default: 500)
    pub jitter_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            blocked_base_ms: 2000,
            error_base_ms: 1500,
            jitter_ms: 500,
        }
    }
}
