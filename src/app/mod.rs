pub mod context;
pub mod error;

pub use context::{AppContext, SnapshotReport};
pub use error::{AcquireError, ErrorCategory, RenderError, Result, ScoutError};
