use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fieldscout::app::AppContext;
use fieldscout::cli::{commands, Cli, Commands};
use fieldscout::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let ctx = Arc::new(AppContext::new(config)?);

    match cli.command {
        Commands::Serve => {
            commands::serve(ctx).await?;
        }
        Commands::Scrape {
            url,
            strategy,
            json,
        } => {
            commands::scrape(&ctx, &url, strategy.as_deref(), json).await?;
        }
        Commands::Snapshot { target } => {
            commands::snapshot(ctx, target.as_deref()).await?;
        }
        Commands::Daemon => {
            commands::daemon(ctx).await?;
        }
        Commands::Targets => {
            commands::list_targets(&ctx)?;
        }
    }

    Ok(())
}
