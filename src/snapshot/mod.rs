//! Persists harvested output under the data directory.
//!
//! Files are named `{slug}-{timestamp}.{json,csv,html}`, where the timestamp
//! is an ISO-8601 instant with `:` and `.` replaced by `-`.

pub mod fs;

pub use fs::FsSnapshotWriter;

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};

use crate::app::{Result, ScoutError};
use crate::domain::{NormalizedEvent, EVENT_FIELDS};

pub trait SnapshotWriter: Send + Sync {
    /// `{count, events}` document.
    fn write_json(&self, slug: &str, stamp: &str, events: &[NormalizedEvent]) -> Result<PathBuf>;
    fn write_csv(&self, slug: &str, stamp: &str, events: &[NormalizedEvent]) -> Result<PathBuf>;
    /// Raw markup, kept when no events could be produced.
    fn write_html(&self, slug: &str, stamp: &str, markup: &str) -> Result<PathBuf>;
}

/// Filename-safe timestamp, e.g. `2024-10-06T04-59-00-000Z`.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

pub fn file_name(slug: &str, stamp: &str, extension: &str) -> String {
    format!("{}-{}.{}", slug, stamp, extension)
}

/// CSV with a plain header row and every data cell quoted.
pub fn to_csv(events: &[NormalizedEvent]) -> Result<String> {
    let mut out = EVENT_FIELDS.join(",");
    out.push('\n');

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    for event in events {
        writer.write_record(event.fields())?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ScoutError::Other(format!("Failed to flush CSV: {}", e)))?;
    out.push_str(&String::from_utf8_lossy(&bytes));
    Ok(out)
}

/// Parse CSV produced by [`to_csv`].
pub fn from_csv(text: &str) -> Result<Vec<NormalizedEvent>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let mut events = Vec::new();
    for record in reader.deserialize() {
        events.push(record?);
    }
    Ok(events)
}
