use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::acquire::{Acquirer, BackoffPolicy, BlockDetector, ConcurrencyGate};
use crate::app::error::Result;
use crate::config::{Config, TargetSpec, TargetTable};
use crate::domain::{Acquired, FetchRequest, Harvest, Payload, Strategy, StrategyHint};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::normalizer::{FieldMap, FieldMapAdapter, Normalizer, SelectorExtractor};
use crate::scraper::{ChromeRenderer, NoopRenderer, Renderer, DEFAULT_USER_AGENT};
use crate::snapshot::{self, FsSnapshotWriter, SnapshotWriter};

/// Outcome of one target's snapshot run.
#[derive(Debug, Clone)]
pub struct SnapshotReport {
    pub slug: String,
    pub strategy: Strategy,
    pub events: usize,
    pub files: Vec<PathBuf>,
}

pub struct AppContext {
    pub config: Config,
    pub targets: TargetTable,
    pub acquirer: Acquirer,
    pub detector: Arc<BlockDetector>,
    pub normalizer: Normalizer,
    pub snapshots: Arc<dyn SnapshotWriter>,
}

impl AppContext {
    /// Wire the Chrome renderer (or none, when rendering is disabled), a
    /// reqwest fetcher and the filesystem snapshot writer.
    pub fn new(config: Config) -> Result<Self> {
        let renderer: Arc<dyn Renderer> = if config.browser.enabled {
            Arc::new(ChromeRenderer::new(config.browser.clone()))
        } else {
            Arc::new(NoopRenderer)
        };

        let user_agent = config
            .browser
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(
            &user_agent,
            Duration::from_secs(config.acquisition.timeout_secs),
        )?);

        let snapshots: Arc<dyn SnapshotWriter> =
            Arc::new(FsSnapshotWriter::new(config.snapshot.data_dir.clone()));

        Self::with_parts(config, renderer, fetcher, snapshots)
    }

    pub fn with_parts(
        config: Config,
        renderer: Arc<dyn Renderer>,
        fetcher: Arc<dyn Fetcher>,
        snapshots: Arc<dyn SnapshotWriter>,
    ) -> Result<Self> {
        let detector = Arc::new(config.acquisition.detector()?);
        let acquirer = Acquirer::new(renderer, fetcher, ConcurrencyGate::from_config(&config.gate))
            .with_backoff(BackoffPolicy::from_config(&config.acquisition.backoff))
            .with_session_options(config.browser.session_options());

        Ok(Self {
            targets: config.target_table(),
            config,
            acquirer,
            detector,
            normalizer: Normalizer::new(),
            snapshots,
        })
    }

    pub fn request(&self, target: &TargetSpec, url: &str) -> FetchRequest {
        target.request_for(url, &self.config.acquisition, self.detector.clone())
    }

    pub async fn acquire(&self, target: &TargetSpec) -> Result<Acquired> {
        let request = self.request(target, &target.url);
        Ok(self.acquirer.acquire(&request).await?)
    }

    /// Acquire an arbitrary URL using whichever target it belongs to.
    pub async fn acquire_url(
        &self,
        url: &str,
        strategy: Option<StrategyHint>,
    ) -> Result<(TargetSpec, Acquired)> {
        url::Url::parse(url)?;

        let mut target = self.targets.resolve(url);
        if let Some(strategy) = strategy {
            target.strategy = strategy;
        }

        let request = self.request(&target, url);
        let acquired = self.acquirer.acquire(&request).await?;
        Ok((target, acquired))
    }

    /// Turn an acquired payload into normalized events.
    ///
    /// Structured payloads go through the target's field map. Markup goes
    /// through its selector table; without one, or when nothing matches,
    /// the markup is returned as-is.
    pub fn harvest(&self, target: &TargetSpec, acquired: &Acquired) -> Result<Harvest> {
        let source_tag = target.source_tag();

        match acquired.payload {
            Payload::Structured(ref value) => {
                let map = target.fields.clone().unwrap_or_else(FieldMap::default);
                let records = FieldMapAdapter::new(map).records(value);
                Ok(Harvest::Events(
                    self.normalizer.normalize_all(&records, source_tag),
                ))
            }
            Payload::Markup(ref markup) => {
                let Some(ref table) = target.selectors else {
                    return Ok(Harvest::Markup(markup.clone()));
                };
                let records = SelectorExtractor::new(table)?.extract(markup);
                let events = self.normalizer.normalize_all(&records, source_tag);
                if events.is_empty() {
                    warn!(slug = %target.slug, "Selectors matched no events");
                    Ok(Harvest::Markup(markup.clone()))
                } else {
                    Ok(Harvest::Events(events))
                }
            }
        }
    }

    /// Acquire `target`, extract events and write the configured snapshot
    /// files. Write failures are logged and leave the run successful.
    pub async fn snapshot(&self, target: &TargetSpec) -> Result<SnapshotReport> {
        let acquired = self.acquire(target).await?;
        let harvest = self.harvest(target, &acquired)?;
        let stamp = snapshot::timestamp(Utc::now());
        let settings = &self.config.snapshot;

        let mut files = Vec::new();
        let mut record = |result: Result<PathBuf>, kind: &str| match result {
            Ok(path) => files.push(path),
            Err(e) => error!(slug = %target.slug, kind, error = %e, "Failed to write snapshot"),
        };

        let events = match harvest {
            Harvest::Events(ref events) => {
                if settings.json {
                    record(self.snapshots.write_json(&target.slug, &stamp, events), "json");
                }
                if settings.csv {
                    record(self.snapshots.write_csv(&target.slug, &stamp, events), "csv");
                }
                events.len()
            }
            Harvest::Markup(ref markup) => {
                if settings.html_when_empty {
                    record(self.snapshots.write_html(&target.slug, &stamp, markup), "html");
                }
                0
            }
        };

        info!(
            slug = %target.slug,
            strategy = %acquired.strategy,
            events,
            files = files.len(),
            "Snapshot complete"
        );

        Ok(SnapshotReport {
            slug: target.slug.clone(),
            strategy: acquired.strategy,
            events,
            files,
        })
    }
}
