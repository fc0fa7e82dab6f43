//! The acquisition core.
//!
//! Given a [`FetchRequest`](crate::domain::FetchRequest), [`Acquirer`] decides
//! how to get content out of a site that resists automation: query a known data
//! endpoint, render the page and capture its own background responses, read
//! the rendered DOM, or fall back to a plain request.
//!
//! # Architecture
//!
//! ```text
//! Acquirer::acquire
//!   ├─ direct endpoint (Fetcher)            ── usable JSON? done
//!   ├─ for attempt in 1..=N
//!   │    ConcurrencyGate permit
//!   │    Renderer session ─ Interceptor ─ BlockDetector
//!   │    backoff (Sleeper) unless last attempt
//!   └─ plain GET fallback (Fetcher)         ── block-checked
//! ```

mod acquirer;
mod backoff;
mod block;
mod gate;
mod intercept;

pub use acquirer::Acquirer;
pub use backoff::{
    BackoffConfig, BackoffPolicy, FailureKind, Pause, RecordingSleeper, Sleeper, TokioSleeper,
};
pub use block::{BlockDetector, Verdict, DEFAULT_BLOCK_SIGNATURES};
pub use gate::{ConcurrencyGate, GateConfig, GateMode, GatePermit};
pub use intercept::{
    is_empty_structure, payload_is_usable, CapturePolicy, InterceptRule, InterceptedResponse,
    Interceptor,
};
