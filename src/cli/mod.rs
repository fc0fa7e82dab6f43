pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fieldscout")]
#[command(about = "Scrapes tournament listings from anti-bot protected sites", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/fieldscout/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (and the scheduler, unless disabled)
    Serve,
    /// Fetch one URL and print the result
    Scrape {
        /// URL to fetch
        url: String,

        /// Starting strategy: direct-api, render-intercept or render-read
        #[arg(short, long)]
        strategy: Option<String>,

        /// Print extracted events as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Snapshot targets to the data directory
    Snapshot {
        /// Only this target (default: every scheduled target)
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Run scheduled snapshots in the foreground
    Daemon,
    /// List configured targets
    Targets,
}
