//! Known targets and how to acquire them.
//!
//! Everything site-specific is data: a direct endpoint, an interception rule,
//! a field map for structured payloads, a selector table for markup, and
//! acquisition overrides. No target has its own code path.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::acquire::{BlockDetector, InterceptRule};
use crate::config::AcquisitionConfig;
use crate::domain::{DirectEndpoint, FetchRequest, SettleWindow, StrategyHint};
use crate::normalizer::{FieldMap, SelectorTable};

/// One configured target (`[[targets]]` in the config file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSpec {
    pub slug: String,
    pub url: String,

    /// Short name served under `/fastpitch/{alias}`
    pub alias: Option<String>,

    /// Attributed as the sanction when a record has none
    pub source_tag: Option<String>,

    /// Include in scheduled snapshot runs (default: true)
    pub scheduled: bool,

    pub strategy: StrategyHint,
    pub direct: Option<DirectEndpoint>,
    pub intercept: Option<InterceptRule>,
    pub fields: Option<FieldMap>,
    pub selectors: Option<SelectorTable>,

    /// Overrides of the `[acquisition]` defaults
    pub attempts: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub settle_min_ms: Option<u64>,
    pub settle_max_ms: Option<u64>,
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self {
            slug: String::new(),
            url: String::new(),
            alias: None,
            source_tag: None,
            scheduled: true,
            strategy: StrategyHint::default(),
            direct: None,
            intercept: None,
            fields: None,
            selectors: None,
            attempts: None,
            timeout_secs: None,
            settle_min_ms: None,
            settle_max_ms: None,
        }
    }
}

impl TargetSpec {
    /// Ad-hoc target for a URL that matches nothing configured.
    pub fn generic(url: &str) -> Self {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()));

        Self {
            slug: host
                .as_deref()
                .map(|h| h.replace('.', "-"))
                .unwrap_or_else(|| "page".to_string()),
            url: url.to_string(),
            source_tag: host,
            scheduled: false,
            ..Default::default()
        }
    }

    /// Label for records lacking a sanction.
    pub fn source_tag(&self) -> &str {
        self.source_tag.as_deref().unwrap_or(&self.slug)
    }

    /// Build the fetch request for `url` using this target's overrides on top
    /// of `defaults`.
    pub fn request_for(
        &self,
        url: &str,
        defaults: &AcquisitionConfig,
        detector: Arc<BlockDetector>,
    ) -> FetchRequest {
        let settle_min = self.settle_min_ms.unwrap_or(defaults.settle_min_ms);
        let settle_max = self
            .settle_max_ms
            .or(self.settle_min_ms)
            .unwrap_or(defaults.settle_max_ms);

        FetchRequest::new(url)
            .with_strategy(self.strategy)
            .with_attempts(self.attempts.unwrap_or(defaults.attempts))
            .with_timeout(Duration::from_secs(
                self.timeout_secs.unwrap_or(defaults.timeout_secs),
            ))
            .with_settle(SettleWindow::new(
                Duration::from_millis(settle_min),
                Duration::from_millis(settle_max),
            ))
            .with_detector(detector)
            .with_direct(self.direct.clone())
            .with_intercept(self.intercept.clone())
            .with_capture(defaults.capture)
            .with_accept_empty(defaults.accept_empty_payload)
            .with_fallback(defaults.fallback)
            .with_deadline(defaults.deadline_secs.map(Duration::from_secs))
    }

    /// The request for this target's own URL.
    pub fn request(&self, defaults: &AcquisitionConfig, detector: Arc<BlockDetector>) -> FetchRequest {
        self.request_for(&self.url, defaults, detector)
    }
}

fn builtin(slug: &str, url: &str, alias: &str, source_tag: &str) -> TargetSpec {
    TargetSpec {
        slug: slug.to_string(),
        url: url.to_string(),
        alias: Some(alias.to_string()),
        source_tag: Some(source_tag.to_string()),
        ..Default::default()
    }
}

/// Fastpitch event listings the service ships with.
pub fn builtin_targets() -> Vec<TargetSpec> {
    vec![
        TargetSpec {
            settle_min_ms: Some(4000),
            settle_max_ms: Some(4000),
            ..builtin(
                "usssa-events",
                "https://usssa.com/fastpitch/eventSearch/",
                "events",
                "USSSA",
            )
        },
        builtin(
            "pgf-tournaments",
            "https://pgfusa.com/tournaments",
            "pgf",
            "PGF",
        ),
        builtin(
            "bullpen-events",
            "https://play.bullpentournaments.com/events",
            "bullpen",
            "Bullpen",
        ),
        builtin(
            "softballconnected",
            "https://softballconnected.com/tournaments",
            "softballconnected",
            "SoftballConnected",
        ),
    ]
}

/// Lookup table over built-in and configured targets.
#[derive(Debug, Clone, Default)]
pub struct TargetTable {
    targets: Vec<TargetSpec>,
}

impl TargetTable {
    /// Built-in targets, with configured ones replacing built-ins of the same
    /// slug and the rest appended in order.
    pub fn new(configured: &[TargetSpec]) -> Self {
        let mut targets = builtin_targets();
        for spec in configured {
            match targets.iter_mut().find(|t| t.slug == spec.slug) {
                Some(existing) => *existing = spec.clone(),
                None => targets.push(spec.clone()),
            }
        }
        Self { targets }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetSpec> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, slug: &str) -> Option<&TargetSpec> {
        self.targets.iter().find(|t| t.slug == slug)
    }

    pub fn by_alias(&self, alias: &str) -> Option<&TargetSpec> {
        self.targets
            .iter()
            .find(|t| t.alias.as_deref() == Some(alias))
    }

    pub fn scheduled(&self) -> impl Iterator<Item = &TargetSpec> {
        self.targets.iter().filter(|t| t.scheduled)
    }

    /// The target whose URL is the longest prefix of `url`, or a generic one.
    ///
    /// A prefix only counts when it ends on a path boundary, so
    /// `/tournaments` does not claim `/tournaments-archive`.
    pub fn resolve(&self, url: &str) -> TargetSpec {
        let wanted = trim_scheme_and_slash(url);
        self.targets
            .iter()
            .filter(|t| covers(trim_scheme_and_slash(&t.url), wanted))
            .max_by_key(|t| t.url.len())
            .cloned()
            .unwrap_or_else(|| TargetSpec::generic(url))
    }
}

fn covers(prefix: &str, url: &str) -> bool {
    match url.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}

fn trim_scheme_and_slash(url: &str) -> &str {
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let url = url.strip_prefix("www.").unwrap_or(url);
    url.trim_end_matches('/')
}
