use std::sync::Arc;

use tracing::info;

use crate::app::{AppContext, Result, ScoutError};
use crate::daemon::{shutdown_signal, Daemon};
use crate::domain::{EventsDocument, Harvest, NormalizedEvent, StrategyHint};
use crate::server;

/// Run the HTTP server; the scheduler runs beside it when enabled.
pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let addr = ctx.config.server.addr()?;

    let scheduler = if ctx.config.schedule.enabled {
        let daemon = Daemon::new(ctx.clone())?;
        Some(tokio::spawn(async move {
            daemon.run_until(std::future::pending()).await
        }))
    } else {
        info!("Scheduler disabled");
        None
    };

    let result = server::serve(ctx, addr, shutdown_signal()).await;

    if let Some(handle) = scheduler {
        handle.abort();
    }
    result
}

pub async fn scrape(ctx: &AppContext, url: &str, strategy: Option<&str>, json: bool) -> Result<()> {
    let strategy = strategy
        .map(str::parse::<StrategyHint>)
        .transpose()
        .map_err(ScoutError::Other)?;

    let (target, acquired) = ctx.acquire_url(url, strategy).await?;
    info!(
        slug = %target.slug,
        strategy = %acquired.strategy,
        attempts = acquired.attempts.len(),
        "Acquired"
    );

    match ctx.harvest(&target, &acquired)? {
        Harvest::Events(events) => {
            if json {
                let document = EventsDocument::new(events);
                println!("{}", serde_json::to_string_pretty(&document)?);
            } else {
                print_events(&events);
                println!("{} events via {}", events.len(), acquired.strategy);
            }
        }
        Harvest::Markup(markup) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&EventsDocument::new(Vec::new()))?);
            } else {
                println!("{}", markup);
            }
            eprintln!("No events extracted ({} bytes of markup)", markup.len());
        }
    }

    Ok(())
}

fn print_events(events: &[NormalizedEvent]) {
    for event in events {
        println!(
            "{}  {} - {}  {}  [{}]",
            event.event_name, event.start_date, event.end_date, event.location, event.sanction
        );
        if event.link != crate::domain::NOT_AVAILABLE {
            println!("  {}", event.link);
        }
    }
}

/// Snapshot one target, or every scheduled target when `slug` is `None`.
pub async fn snapshot(ctx: Arc<AppContext>, slug: Option<&str>) -> Result<()> {
    let Some(slug) = slug else {
        let summary = Daemon::new(ctx)?.run_once().await;
        println!(
            "Snapshot complete: {} targets ok, {} failed, {} events",
            summary.succeeded, summary.failed, summary.events
        );
        return Ok(());
    };

    let target = ctx
        .targets
        .get(slug)
        .ok_or_else(|| ScoutError::TargetNotFound(slug.to_string()))?;

    let report = ctx.snapshot(target).await?;
    println!(
        "{}: {} events via {}",
        report.slug, report.events, report.strategy
    );
    for file in &report.files {
        println!("  {}", file.display());
    }
    Ok(())
}

pub async fn daemon(ctx: Arc<AppContext>) -> Result<()> {
    Daemon::new(ctx)?.run().await
}

pub fn list_targets(ctx: &AppContext) -> Result<()> {
    if ctx.targets.is_empty() {
        println!("No targets");
        return Ok(());
    }

    for target in ctx.targets.iter() {
        let schedule = if target.scheduled { "scheduled" } else { "on demand" };
        println!("{} ({}, {})", target.slug, target.strategy, schedule);
        println!("  {}", target.url);
        if let Some(ref alias) = target.alias {
            println!("  /fastpitch/{}", alias);
        }
    }

    Ok(())
}
