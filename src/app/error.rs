use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unknown target: {0}")]
    TargetNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ScoutError>;

impl ScoutError {
    /// Category reported to HTTP clients. Failures outside acquisition are
    /// either the caller's (`request`) or ours (`internal`).
    pub fn category(&self) -> ErrorCategory {
        match self {
            ScoutError::Acquire(e) => e.category(),
            ScoutError::Http(_) | ScoutError::Status { .. } => ErrorCategory::Transport,
            ScoutError::InvalidUrl(_) | ScoutError::TargetNotFound(_) => ErrorCategory::Request,
            ScoutError::Io(_)
            | ScoutError::Json(_)
            | ScoutError::Csv(_)
            | ScoutError::Config(_)
            | ScoutError::Other(_) => ErrorCategory::Internal,
        }
    }
}

impl From<ConfigError> for ScoutError {
    fn from(err: ConfigError) -> Self {
        ScoutError::Config(err.to_string())
    }
}

/// Terminal failure of a fetch request.
///
/// Every per-attempt problem is classified into one of these kinds inside the
/// acquisition core; nothing else crosses its boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    #[error("Too many concurrent rendering sessions (max {max}). Try again later.")]
    CapacityExceeded { max: usize },

    #[error("Blocked by target after {attempts} attempt(s): matched {signature:?}")]
    Blocked { attempts: u32, signature: String },

    #[error("Transport failure after {attempts} attempt(s): {cause}")]
    Transport { attempts: u32, cause: String },

    #[error("Timed out after {attempts} attempt(s): {cause}")]
    Timeout { attempts: u32, cause: String },

    #[error("Malformed structured payload: {0}")]
    Parse(String),
}

/// Machine-readable cause category exposed to HTTP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Capacity,
    Blocked,
    Transport,
    Timeout,
    Parse,
    Request,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Capacity => "capacity",
            ErrorCategory::Blocked => "blocked",
            ErrorCategory::Transport => "transport",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Parse => "parse",
            ErrorCategory::Request => "request",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl AcquireError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AcquireError::CapacityExceeded { .. } => ErrorCategory::Capacity,
            AcquireError::Blocked { .. } => ErrorCategory::Blocked,
            AcquireError::Transport { .. } => ErrorCategory::Transport,
            AcquireError::Timeout { .. } => ErrorCategory::Timeout,
            AcquireError::Parse(_) => ErrorCategory::Parse,
        }
    }
}

/// Errors raised by a rendering backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Rendering unavailable: {0}")]
    Unavailable(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Navigation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Session error: {0}")]
    Session(String),
}
