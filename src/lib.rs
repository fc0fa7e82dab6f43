//! # fieldscout
//!
//! Collects tournament listings from sites that sit behind anti-bot
//! protection and serves them as normalized events.
//!
//! ## Architecture
//!
//! ```text
//! HTTP / CLI / Scheduler → Acquirer → Harvest (adapter | selectors) → Normalizer → Snapshot
//! ```
//!
//! - [`acquire`]: concurrency gate, retry/backoff, block detection, interception
//! - [`normalizer`]: turns raw records into [`NormalizedEvent`](domain::NormalizedEvent)s
//! - [`snapshot`]: JSON, CSV and HTML files under the data directory
//! - [`server`]: axum front-end
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the server and the weekly snapshot job
//! fieldscout serve
//!
//! # Fetch one page
//! fieldscout scrape https://pgfusa.com/tournaments --json
//!
//! # Snapshot every scheduled target now
//! fieldscout snapshot
//! ```

/// Multi-strategy acquisition of a single URL.
pub mod acquire;

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// target table, acquirer, normalizer, snapshot writer.
pub mod app;

/// Command-line interface using clap.
///
/// - `serve` - HTTP server plus scheduler
/// - `scrape <url>` - Fetch one URL
/// - `snapshot [--target]` - Write snapshots now
/// - `daemon` - Scheduler only
/// - `targets` - List configured targets
pub mod cli;

/// Configuration loaded from `~/.config/fieldscout/config.toml`, with
/// environment overrides and the target table.
pub mod config;

/// Weekly or interval-based snapshot scheduling.
pub mod daemon;

/// Core domain models: fetch requests, outcomes and events.
pub mod domain;

/// Plain HTTP fetching used for direct endpoints and the fallback.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for plain fetches
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
pub mod fetcher;

/// Raw record extraction and event normalization.
pub mod normalizer;

/// Rendering backends.
///
/// - [`ChromeRenderer`](scraper::ChromeRenderer): headless Chrome via chromiumoxide
/// - [`ScraperConfig`](scraper::ScraperConfig): Configuration options
/// - [`Renderer`](scraper::Renderer): Async trait for rendering implementations
pub mod scraper;

/// HTTP front-end.
pub mod server;

/// Snapshot persistence.
pub mod snapshot;
