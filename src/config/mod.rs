//! Configuration management for fieldscout.
//!
//! Configuration is read from `~/.config/fieldscout/config.toml` unless
//! another path is given. If the file doesn't exist, a default configuration
//! with comments is created. `PORT`, `DATA_DIR` and `MAX_CONCURRENT_BROWSERS`
//! override the file.

pub mod targets;

pub use targets::{builtin_targets, TargetSpec, TargetTable};

use std::fs;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::acquire::{
    BackoffConfig, BlockDetector, CapturePolicy, GateConfig, DEFAULT_BLOCK_SIGNATURES,
};
use crate::daemon::ScheduleConfig;
use crate::scraper::ScraperConfig;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub browser: ScraperConfig,
    pub acquisition: AcquisitionConfig,
    pub gate: GateConfig,
    pub snapshot: SnapshotConfig,
    pub schedule: ScheduleConfig,
    pub targets: Vec<TargetSpec>,
}

/// HTTP front-end configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("Invalid server host: {}", self.host)))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10000,
        }
    }
}

/// Defaults applied to every fetch request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Render attempts per request (default: 3)
    pub attempts: u32,

    /// Navigation timeout per attempt in seconds (default: 60)
    pub timeout_secs: u64,

    /// Post-load settle window in milliseconds (default: 3000..3000)
    pub settle_min_ms: u64,
    pub settle_max_ms: u64,

    /// Overall deadline per request in seconds; unbounded when unset
    pub deadline_secs: Option<u64>,

    /// Case-insensitive regexes marking a page as blocked
    pub block_signatures: Vec<String>,

    /// Which intercepted payload wins: first, last or merge (default: first)
    pub capture: CapturePolicy,

    /// Treat empty structured payloads as success (default: false)
    pub accept_empty_payload: bool,

    /// Try one plain request after the render budget is spent (default: true)
    pub fallback: bool,

    pub backoff: BackoffConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout_secs: 60,
            settle_min_ms: 3000,
            settle_max_ms: 3000,
            deadline_secs: None,
            block_signatures: DEFAULT_BLOCK_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            capture: CapturePolicy::First,
            accept_empty_payload: false,
            fallback: true,
            backoff: BackoffConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    pub fn detector(&self) -> Result<BlockDetector, ConfigError> {
        BlockDetector::new(self.block_signatures.iter().cloned())
            .map_err(|e| ConfigError::Invalid(format!("block signature: {}", e)))
    }
}

/// Snapshot output configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Directory snapshots are written to, created if missing (default: ./data)
    pub data_dir: PathBuf,

    /// Write `{slug}-{timestamp}.json` (default: true)
    pub json: bool,

    /// Write `{slug}-{timestamp}.csv` (default: true)
    pub csv: bool,

    /// Keep the raw markup when no events could be extracted (default: true)
    pub html_when_empty: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            json: true,
            csv: true,
            html_when_empty: true,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default path when `None`.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        let mut config = if config_path.exists() {
            Self::read(&config_path)?
        } else {
            Self::create_default_config(&config_path)?;
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/fieldscout/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("fieldscout").join("config.toml"))
    }

    /// Apply environment overrides. Unparseable values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            match port.trim().parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(value = %port, "Ignoring invalid PORT"),
            }
        }

        if let Some(dir) = lookup("DATA_DIR").filter(|d| !d.trim().is_empty()) {
            self.snapshot.data_dir = PathBuf::from(dir);
        }

        if let Some(max) = lookup("MAX_CONCURRENT_BROWSERS") {
            match max.trim().parse::<usize>() {
                Ok(max) if max > 0 => self.gate.max_sessions = max,
                _ => warn!(value = %max, "Ignoring invalid MAX_CONCURRENT_BROWSERS"),
            }
        }
    }

    /// The built-in targets merged with `[[targets]]`.
    pub fn target_table(&self) -> TargetTable {
        TargetTable::new(&self.targets)
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# fieldscout configuration
#
# Environment variables PORT, DATA_DIR and MAX_CONCURRENT_BROWSERS override
# the matching settings below.

[server]
host = "0.0.0.0"
port = 10000

[browser]
# Set to false to skip rendering and only make plain requests
enabled = true
headless = true
# chrome_executable = "/usr/bin/chromium"
window_width = 1280
window_height = 800
# dom_content_loaded or load
wait_until = "dom_content_loaded"
user_agent = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
extra_args = []

[acquisition]
attempts = 3
timeout_secs = 60
# Randomized pause after load, in milliseconds
settle_min_ms = 3000
settle_max_ms = 3000
# deadline_secs = 300
block_signatures = ["access denied", "forbidden", "captcha", "403", "blocked"]
# first, last or merge
capture = "first"
accept_empty_payload = false
fallback = true

[acquisition.backoff]
blocked_base_ms = 2000
error_base_ms = 1500
jitter_ms = 500

[gate]
max_sessions = 2
# fail_fast or wait
mode = "fail_fast"
wait_timeout_secs = 30

[snapshot]
data_dir = "data"
json = true
csv = true
html_when_empty = true

[schedule]
# Run scheduled snapshots while `serve` is up
enabled = true
# Weekly run in `timezone`. Set `every` (e.g. "6h") for a fixed interval instead.
weekday = "sun"
time = "23:59"
timezone = "America/Indiana/Indianapolis"
# every = "6h"
run_on_start = false

# Extra targets, or overrides of built-in ones by slug:
#
# [[targets]]
# slug = "travel-ball"
# url = "https://travel.example/events"
# strategy = "render-intercept"
# settle_min_ms = 2000
# settle_max_ms = 5000
#
# [targets.intercept]
# url_contains = ["/api/events"]
#
# [targets.fields]
# records = "/data/events"
# location = { join = ["/city", "/state"] }
#
# [targets.selectors]
# row = "table tbody tr"
# event_name = "td:nth-of-type(1)"
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
