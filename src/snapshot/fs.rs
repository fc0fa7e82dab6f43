use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::app::Result;
use crate::domain::{EventsDocument, NormalizedEvent};
use crate::snapshot::{file_name, to_csv, SnapshotWriter};

/// Writes snapshots as plain files, creating the data directory on demand.
pub struct FsSnapshotWriter {
    data_dir: PathBuf,
}

impl FsSnapshotWriter {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn write(&self, name: String, contents: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.data_dir)?;
        let path = self.data_dir.join(name);
        fs::write(&path, contents)?;
        info!(path = %path.display(), bytes = contents.len(), "Wrote snapshot");
        Ok(path)
    }
}

impl SnapshotWriter for FsSnapshotWriter {
    fn write_json(&self, slug: &str, stamp: &str, events: &[NormalizedEvent]) -> Result<PathBuf> {
        let document = EventsDocument::new(events.to_vec());
        let json = serde_json::to_string_pretty(&document)?;
        self.write(file_name(slug, stamp, "json"), &json)
    }

    fn write_csv(&self, slug: &str, stamp: &str, events: &[NormalizedEvent]) -> Result<PathBuf> {
        let csv = to_csv(events)?;
        self.write(file_name(slug, stamp, "csv"), &csv)
    }

    fn write_html(&self, slug: &str, stamp: &str, markup: &str) -> Result<PathBuf> {
        self.write(file_name(slug, stamp, "html"), markup)
    }
}
