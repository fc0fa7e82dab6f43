//! Scheduled snapshot runs.
//!
//! Runs every scheduled target either weekly at a fixed wall-clock time in
//! the configured timezone (Sunday 23:59 Indianapolis time by default) or on
//! a fixed interval. Targets are independent: a
//! failure is logged and the run moves on to the next one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::app::{AppContext, Result, ScoutError};

/// Schedule configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Run the scheduler alongside `serve` (default: true)
    pub enabled: bool,

    /// Day of the weekly run (default: sun)
    pub weekday: String,

    /// Wall-clock time of the weekly run, HH:MM (default: 23:59)
    pub time: String,

    /// IANA zone the weekly run is pinned to (default: America/Indiana/Indianapolis)
    pub timezone: String,

    /// Fixed interval such as "6h" or "1d"; replaces the weekly run when set
    pub every: Option<String>,

    /// Run once immediately on start (default: false)
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weekday: "sun".to_string(),
            time: "23:59".to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            every: None,
            run_on_start: false,
        }
    }
}

pub const DEFAULT_TIMEZONE: &str = "America/Indiana/Indianapolis";

impl ScheduleConfig {
    pub fn timezone(&self) -> std::result::Result<Tz, String> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| format!("Unknown timezone: {}", self.timezone))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Weekly { weekday: Weekday, at: NaiveTime },
    Every(Duration),
}

impl Schedule {
    pub fn from_config(config: &ScheduleConfig) -> std::result::Result<Self, String> {
        if let Some(ref every) = config.every {
            let secs = parse_interval(every)?;
            if secs == 0 {
                return Err("Interval must be greater than zero".to_string());
            }
            return Ok(Schedule::Every(Duration::from_secs(secs)));
        }

        let weekday = config
            .weekday
            .trim()
            .parse::<Weekday>()
            .map_err(|_| format!("Invalid weekday: {}", config.weekday))?;
        let at = NaiveTime::parse_from_str(config.time.trim(), "%H:%M")
            .map_err(|_| format!("Invalid time: {}. Use HH:MM", config.time))?;

        Ok(Schedule::Weekly { weekday, at })
    }

    /// First run strictly after `now`.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        match *self {
            Schedule::Every(interval) => {
                now.clone() + chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::zero())
            }
            Schedule::Weekly { weekday, at } => {
                let today = now.weekday().num_days_from_monday() as i64;
                let wanted = weekday.num_days_from_monday() as i64;
                let days_ahead = (wanted - today).rem_euclid(7);

                let mut date = now.date_naive() + chrono::Duration::days(days_ahead);
                loop {
                    if let Some(candidate) = local_at(&now.timezone(), date, at) {
                        if candidate > *now {
                            return candidate;
                        }
                    }
                    date += chrono::Duration::days(7);
                }
            }
        }
    }
}

/// `date` at `at` in `tz`, shifted past a DST gap if needed.
fn local_at<Tz: TimeZone>(tz: &Tz, date: chrono::NaiveDate, at: NaiveTime) -> Option<DateTime<Tz>> {
    let naive = date.and_time(at);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + chrono::Duration::hours(1))).earliest())
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Weekly { weekday, at } => {
                write!(f, "weekly on {} at {}", weekday, at.format("%H:%M"))
            }
            Schedule::Every(interval) => write!(f, "every {}", format_interval(interval.as_secs())),
        }
    }
}

/// Parse interval string like "1h", "30m", "6h", "1d"
pub fn parse_interval(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .map(|h| h * 3600)
            .map_err(|_| format!("Invalid hours: {}", hours))
    } else if let Some(minutes) = s.strip_suffix('m') {
        minutes
            .parse::<u64>()
            .map(|m| m * 60)
            .map_err(|_| format!("Invalid minutes: {}", minutes))
    } else if let Some(days) = s.strip_suffix('d') {
        days.parse::<u64>()
            .map(|d| d * 86400)
            .map_err(|_| format!("Invalid days: {}", days))
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>()
            .map_err(|_| format!("Invalid seconds: {}", secs))
    } else {
        s.parse::<u64>()
            .map_err(|_| format!("Invalid interval: {}. Use format like '6h', '30m', '1d'", s))
    }
}

/// Format interval for display
pub fn format_interval(secs: u64) -> String {
    if secs >= 86400 && secs.is_multiple_of(86400) {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Resolves on SIGINT or SIGTERM (Ctrl-C elsewhere).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                }
            }
            _ => {
                warn!("Failed to install signal handlers, falling back to Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received");
}

/// Totals for one pass over the scheduled targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub events: usize,
}

pub struct Daemon {
    ctx: Arc<AppContext>,
    schedule: Schedule,
    timezone: Tz,
    run_on_start: bool,
}

impl Daemon {
    pub fn new(ctx: Arc<AppContext>) -> Result<Self> {
        let config = &ctx.config.schedule;
        let schedule = Schedule::from_config(config).map_err(ScoutError::Config)?;
        let timezone = config.timezone().map_err(ScoutError::Config)?;
        let run_on_start = config.run_on_start;

        Ok(Self {
            ctx,
            schedule,
            timezone,
            run_on_start,
        })
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Next run after `now`, evaluated in the configured timezone.
    pub fn next_run(&self, now: DateTime<Utc>) -> DateTime<Tz> {
        self.schedule.next_after(&now.with_timezone(&self.timezone))
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(&self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(schedule = %self.schedule, timezone = %self.timezone, "Scheduler started");

        if self.run_on_start {
            info!("Running initial snapshot...");
            self.run_once().await;
        }

        loop {
            let now = Utc::now();
            let next = self.next_run(now);
            let wait = (next.with_timezone(&Utc) - now).to_std().unwrap_or_default();
            info!(next = %next.format("%Y-%m-%d %H:%M %Z"), "Next snapshot run scheduled");

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(wait) => {
                    self.run_once().await;
                }
            }
        }

        info!("Scheduler shutting down");
        Ok(())
    }

    /// Snapshot every scheduled target once, in order.
    pub async fn run_once(&self) -> RunSummary {
        let start = Utc::now();
        let mut summary = RunSummary::default();

        for target in self.ctx.targets.scheduled() {
            match self.ctx.snapshot(target).await {
                Ok(report) => {
                    summary.succeeded += 1;
                    summary.events += report.events;
                    info!(slug = %report.slug, events = report.events, "Snapshot stored");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(slug = %target.slug, error = %e, "Snapshot failed");
                }
            }
        }

        let elapsed = Utc::now().signed_duration_since(start);
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            events = summary.events,
            "Snapshot run complete ({:.1}s)",
            elapsed.num_milliseconds() as f64 / 1000.0
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::FixedOffset;
    use tempfile::TempDir;

    use super::*;
    use crate::config::{Config, TargetSpec};
    use crate::fetcher::{FetchedPage, Fetcher};
    use crate::normalizer::SelectorTable;
    use crate::scraper::scripted::{ScriptedRenderer, SessionScript};
    use crate::snapshot::FsSnapshotWriter;

    fn at(rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("1h").unwrap(), 3600);
        assert_eq!(parse_interval("30m").unwrap(), 1800);
        assert_eq!(parse_interval("1d").unwrap(), 86400);
        assert_eq!(parse_interval("45s").unwrap(), 45);
        assert_eq!(parse_interval("120").unwrap(), 120);
        assert!(parse_interval("soon").is_err());
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(86400), "1d");
        assert_eq!(format_interval(21600), "6h");
        assert_eq!(format_interval(90), "90s");
    }

    #[test]
    fn test_default_schedule_is_sunday_night() {
        let schedule = Schedule::from_config(&ScheduleConfig::default()).unwrap();
        assert_eq!(
            schedule,
            Schedule::Weekly {
                weekday: Weekday::Sun,
                at: NaiveTime::from_hms_opt(23, 59, 0).unwrap()
            }
        );
        assert_eq!(schedule.to_string(), "weekly on Sun at 23:59");
    }

    #[test]
    fn test_next_weekly_run() {
        let schedule = Schedule::from_config(&ScheduleConfig::default()).unwrap();

        // Wednesday -> the coming Sunday
        let next = schedule.next_after(&at("2025-03-05T10:00:00-05:00"));
        assert_eq!(next, at("2025-03-09T23:59:00-05:00"));

        // Sunday before the slot -> same day
        let next = schedule.next_after(&at("2025-03-09T08:00:00-05:00"));
        assert_eq!(next, at("2025-03-09T23:59:00-05:00"));

        // Exactly at the slot -> a week later
        let next = schedule.next_after(&at("2025-03-09T23:59:00-05:00"));
        assert_eq!(next, at("2025-03-16T23:59:00-05:00"));
    }

    #[test]
    fn test_interval_schedule() {
        let config = ScheduleConfig {
            every: Some("6h".into()),
            ..Default::default()
        };
        let schedule = Schedule::from_config(&config).unwrap();
        assert_eq!(schedule.to_string(), "every 6h");
        assert_eq!(
            schedule.next_after(&at("2025-03-05T10:00:00Z")),
            at("2025-03-05T16:00:00Z")
        );
    }

    #[test]
    fn test_invalid_schedule() {
        let bad_day = ScheduleConfig {
            weekday: "someday".into(),
            ..Default::default()
        };
        assert!(Schedule::from_config(&bad_day).is_err());

        let bad_time = ScheduleConfig {
            time: "25:00".into(),
            ..Default::default()
        };
        assert!(Schedule::from_config(&bad_time).is_err());

        let zero = ScheduleConfig {
            every: Some("0m".into()),
            ..Default::default()
        };
        assert!(Schedule::from_config(&zero).is_err());

        let bad_zone = ScheduleConfig {
            timezone: "Mars/Olympus_Mons".into(),
            ..Default::default()
        };
        assert!(bad_zone.timezone().is_err());
    }

    #[test]
    fn test_weekly_run_follows_configured_timezone() {
        let config = ScheduleConfig::default();
        let schedule = Schedule::from_config(&config).unwrap();
        let tz = config.timezone().unwrap();
        assert_eq!(tz, chrono_tz::America::Indiana::Indianapolis);

        let utc = |s: &str| DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc);

        // Sunday 23:00 UTC is Sunday afternoon in Indianapolis, so the run is
        // still ahead: 23:59 EST is 04:59 UTC on Monday.
        let next = schedule.next_after(&utc("2025-01-19T23:00:00Z").with_timezone(&tz));
        assert_eq!(next.with_timezone(&Utc), utc("2025-01-20T04:59:00Z"));

        // Daylight time shifts the slot by an hour.
        let next = schedule.next_after(&utc("2025-07-02T12:00:00Z").with_timezone(&tz));
        assert_eq!(next.with_timezone(&Utc), utc("2025-07-07T03:59:00Z"));
    }

    struct OfflineFetcher;

    #[async_trait]
    impl Fetcher for OfflineFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage> {
            Err(ScoutError::Status {
                url: url.to_string(),
                status: 503,
            })
        }
    }

    const TABLE: &str = "<table><tbody><tr><td>Fall Classic</td><td>10/05</td><td></td><td>Muncie</td></tr></tbody></table>";

    #[tokio::test]
    async fn test_failed_target_does_not_stop_the_run() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.acquisition.settle_min_ms = 0;
        config.acquisition.settle_max_ms = 0;
        config.acquisition.attempts = 1;
        config.snapshot.data_dir = tmp.path().to_path_buf();
        config.targets = vec![
            TargetSpec {
                slug: "usssa-events".into(),
                url: "https://usssa.com/fastpitch/eventSearch/".into(),
                ..Default::default()
            },
            TargetSpec {
                slug: "pgf-tournaments".into(),
                url: "https://pgfusa.com/tournaments".into(),
                source_tag: Some("PGF".into()),
                selectors: Some(SelectorTable::default()),
                ..Default::default()
            },
        ];

        // Sessions are opened in target order: the first one is blocked.
        let renderer = ScriptedRenderer::sequence(vec![
            SessionScript::blocked(),
            SessionScript::markup(TABLE),
        ]);
        let ctx = AppContext::with_parts(
            config,
            Arc::new(renderer),
            Arc::new(OfflineFetcher),
            Arc::new(FsSnapshotWriter::new(tmp.path())),
        )
        .unwrap();
        let scheduled = ctx.targets.scheduled().count();
        assert_eq!(scheduled, 4);

        let summary = Daemon::new(Arc::new(ctx)).unwrap().run_once().await;

        assert_eq!(
            summary,
            RunSummary {
                succeeded: scheduled - 1,
                failed: 1,
                events: 1,
            }
        );
    }
}
