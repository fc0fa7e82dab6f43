use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::app::AcquireError;

/// Behaviour when every rendering slot is taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// Reject immediately with [`AcquireError::CapacityExceeded`].
    #[default]
    FailFast,
    /// Wait up to the configured timeout for a slot.
    Wait,
}

/// Concurrency gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Maximum concurrent rendering sessions (default: 2)
    pub max_sessions: usize,

    /// fail_fast or wait (default: fail_fast)
    pub mode: GateMode,

    /// How long a waiting request may queue, in seconds (default: 30)
    pub wait_timeout_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_sessions: 2,
            mode: GateMode::FailFast,
            wait_timeout_secs: 30,
        }
    }
}

struct GateState {
    permits: Arc<Semaphore>,
    max: usize,
    mode: GateMode,
    wait_timeout: Duration,
    in_use: AtomicUsize,
    waiting: AtomicUsize,
}

/// Process-wide bound on open rendering sessions.
///
/// Cloning shares the same slots.
#[derive(Clone)]
pub struct ConcurrencyGate {
    state: Arc<GateState>,
}

/// A held rendering slot. Dropping it releases the slot.
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    state: Arc<GateState>,
}

impl GatePermit {
    pub fn release(self) {}
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.state.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGate {
    pub fn new(max: usize, mode: GateMode, wait_timeout: Duration) -> Self {
        let max = max.max(1);
        Self {
            state: Arc::new(GateState {
                permits: Arc::new(Semaphore::new(max)),
                max,
                mode,
                wait_timeout,
                in_use: AtomicUsize::new(0),
                waiting: AtomicUsize::new(0),
            }),
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(
            config.max_sessions,
            config.mode,
            Duration::from_secs(config.wait_timeout_secs),
        )
    }

    pub fn max(&self) -> usize {
        self.state.max
    }

    pub fn mode(&self) -> GateMode {
        self.state.mode
    }

    pub fn wait_timeout(&self) -> Duration {
        self.state.wait_timeout
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.state.in_use.load(Ordering::SeqCst)
    }

    /// Callers currently queued for a slot.
    pub fn waiting(&self) -> usize {
        self.state.waiting.load(Ordering::SeqCst)
    }

    /// Acquire according to the configured mode.
    pub async fn acquire(&self) -> Result<GatePermit, AcquireError> {
        self.acquire_within(None).await
    }

    /// Like [`ConcurrencyGate::acquire`], with waiting further capped by `limit`.
    pub async fn acquire_within(&self, limit: Option<Duration>) -> Result<GatePermit, AcquireError> {
        match self.state.mode {
            GateMode::FailFast => self.try_acquire(),
            GateMode::Wait => {
                let timeout = match limit {
                    Some(limit) => limit.min(self.state.wait_timeout),
                    None => self.state.wait_timeout,
                };
                self.acquire_wait(timeout).await
            }
        }
    }

    pub fn try_acquire(&self) -> Result<GatePermit, AcquireError> {
        let permit = self
            .state
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| self.capacity_error())?;
        Ok(self.admit(permit))
    }

    /// Wait up to `timeout` for a slot, regardless of mode.
    pub async fn acquire_wait(&self, timeout: Duration) -> Result<GatePermit, AcquireError> {
        if let Ok(permit) = self.try_acquire() {
            return Ok(permit);
        }

        self.state.waiting.fetch_add(1, Ordering::SeqCst);
        let _waiting = WaitingGuard(&self.state.waiting);

        match tokio::time::timeout(timeout, self.state.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(self.admit(permit)),
            _ => Err(self.capacity_error()),
        }
    }

    fn admit(&self, permit: OwnedSemaphorePermit) -> GatePermit {
        self.state.in_use.fetch_add(1, Ordering::SeqCst);
        GatePermit {
            _permit: permit,
            state: self.state.clone(),
        }
    }

    fn capacity_error(&self) -> AcquireError {
        AcquireError::CapacityExceeded {
            max: self.state.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;

    #[test]
    fn test_fail_fast_rejects_when_saturated() {
        let gate = ConcurrencyGate::new(2, GateMode::FailFast, Duration::from_secs(1));
        let a = gate.try_acquire().unwrap();
        let _b = gate.try_acquire().unwrap();
        assert_eq!(gate.in_use(), 2);

        let err = gate.try_acquire().err().unwrap();
        assert_eq!(err, AcquireError::CapacityExceeded { max: 2 });

        a.release();
        assert_eq!(gate.in_use(), 1);
        assert_ok!(gate.try_acquire());
    }

    #[test]
    fn test_zero_max_is_clamped() {
        let gate = ConcurrencyGate::new(0, GateMode::FailFast, Duration::from_secs(1));
        assert_eq!(gate.max(), 1);
        assert_ok!(gate.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_mode_queues_until_release() {
        let gate = ConcurrencyGate::new(1, GateMode::Wait, Duration::from_secs(30));
        let held = gate.acquire().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|p| p.release()) })
        };

        while gate.waiting() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(gate.in_use(), 1);

        drop(held);
        assert_ok!(waiter.await.unwrap());
        assert_eq!(gate.in_use(), 0);
        assert_eq!(gate.waiting(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_mode_times_out() {
        let gate = ConcurrencyGate::new(1, GateMode::Wait, Duration::from_secs(5));
        let _held = gate.acquire().await.unwrap();

        let err = gate.acquire().await.err().unwrap();
        assert_eq!(err, AcquireError::CapacityExceeded { max: 1 });
        assert_eq!(gate.waiting(), 0);
        assert_eq!(gate.in_use(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_caps_wait() {
        let gate = ConcurrencyGate::new(1, GateMode::Wait, Duration::from_secs(3600));
        let _held = gate.acquire().await.unwrap();

        let started = tokio::time::Instant::now();
        assert!(gate
            .acquire_within(Some(Duration::from_secs(2)))
            .await
            .is_err());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_config_deserializes() {
        let config: GateConfig = toml::from_str("max_sessions = 4\nmode = \"wait\"").unwrap();
        assert_eq!(config.max_sessions, 4);
        assert_eq!(config.mode, GateMode::Wait);
        assert_eq!(config.wait_timeout_secs, 30);
    }
}
