//! HTTP front-end.
//!
//! | Route                  | Response                                            |
//! |------------------------|-----------------------------------------------------|
//! | `GET /health`          | status, active/max sessions, gate mode, data dir    |
//! | `GET /scrape?url=`     | events JSON, or raw HTML when nothing was extracted |
//! | `GET /targets/{slug}`  | same, for a configured target                       |
//! | `GET /fastpitch/{alias}` | raw payload of a configured target                |
//!
//! Failures are `{"error", "category", "details"}` with a status derived from
//! the error category.

mod error;

pub use error::{status_for, ApiError, RETRY_AFTER_SECS};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app::{AppContext, Result};
use crate::config::TargetSpec;
use crate::domain::{EventsDocument, Harvest, Payload, StrategyHint};

pub fn router(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/scrape", get(scrape))
        .route("/targets/:slug", get(target))
        .route("/fastpitch/:alias", get(fastpitch))
        .layer(cors)
        .with_state(ctx)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(ctx: Arc<AppContext>, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let gate = ctx.acquirer.gate();
    Json(json!({
        "status": "ok",
        "active_sessions": gate.in_use(),
        "max_sessions": gate.max(),
        "gate_mode": gate.mode(),
        "data_dir": ctx.config.snapshot.data_dir.display().to_string(),
    }))
}

#[derive(Debug, Deserialize)]
struct ScrapeParams {
    url: Option<String>,
    strategy: Option<String>,
}

async fn scrape(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<ScrapeParams>,
) -> std::result::Result<Response, ApiError> {
    let url = match params.url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => return Err(ApiError::BadRequest("Missing ?url=".to_string())),
    };
    let strategy = params
        .strategy
        .as_deref()
        .map(str::parse::<StrategyHint>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let (target, acquired) = ctx
        .acquire_url(&url, strategy)
        .await
        .map_err(|e| ApiError::scout("Failed to retrieve URL", e))?;
    let harvest = ctx
        .harvest(&target, &acquired)
        .map_err(|e| ApiError::scout("Failed to extract events", e))?;

    Ok(harvest_response(harvest))
}

async fn target(
    State(ctx): State<Arc<AppContext>>,
    Path(slug): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let target = ctx
        .targets
        .get(&slug)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown target: {}", slug)))?;

    let harvest = fetch_harvest(&ctx, target).await?;
    Ok(harvest_response(harvest))
}

async fn fastpitch(
    State(ctx): State<Arc<AppContext>>,
    Path(alias): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let target = ctx
        .targets
        .by_alias(&alias)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown target: {}", alias)))?;

    let acquired = ctx
        .acquire(target)
        .await
        .map_err(|e| ApiError::scout(format!("Failed to fetch {}", target.source_tag()), e))?;

    Ok(match acquired.payload {
        Payload::Markup(markup) => Html(markup).into_response(),
        Payload::Structured(value) => Json(value).into_response(),
    })
}

async fn fetch_harvest(
    ctx: &AppContext,
    target: &TargetSpec,
) -> std::result::Result<Harvest, ApiError> {
    let context = format!("Failed to fetch {}", target.source_tag());
    let acquired = ctx
        .acquire(target)
        .await
        .map_err(|e| ApiError::scout(context.clone(), e))?;
    ctx.harvest(target, &acquired)
        .map_err(|e| ApiError::scout(context, e))
}

fn harvest_response(harvest: Harvest) -> Response {
    match harvest {
        Harvest::Events(events) => Json(EventsDocument::new(events)).into_response(),
        Harvest::Markup(markup) => Html(markup).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::app::ScoutError;
    use crate::config::Config;
    use crate::fetcher::{FetchedPage, Fetcher};
    use crate::normalizer::SelectorTable;
    use crate::scraper::scripted::{ScriptedRenderer, SessionScript};
    use crate::snapshot::FsSnapshotWriter;

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

    fn app(script: SessionScript, tmp: &TempDir) -> Router {
        let mut config = Config::default();
        config.acquisition.settle_min_ms = 0;
        config.acquisition.settle_max_ms = 0;
        config.acquisition.attempts = 1;
        config.snapshot.data_dir = tmp.path().to_path_buf();
        config.targets = vec![TargetSpec {
            slug: "bullpen-events".into(),
            url: "https://play.bullpentournaments.com/events".into(),
            alias: Some("bullpen".into()),
            source_tag: Some("Bullpen".into()),
            selectors: Some(SelectorTable::default()),
            ..Default::default()
        }];

        let ctx = AppContext::with_parts(
            config,
            Arc::new(ScriptedRenderer::repeating(script)),
            Arc::new(OfflineFetcher),
            Arc::new(FsSnapshotWriter::new(tmp.path())),
        )
        .unwrap();
        router(Arc::new(ctx))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, body.to_vec())
    }

    const TABLE: &str = "<table><tbody><tr><td>Bullpen Bash</td><td>03/03</td><td>03/04</td><td>Plainfield, IN</td></tr></tbody></table>";

    #[tokio::test]
    async fn test_health() {
        let tmp = TempDir::new().unwrap();
        let (status, _, body) = get(app(SessionScript::markup(TABLE), &tmp), "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["active_sessions"], 0);
        assert_eq!(json["max_sessions"], 2);
        assert_eq!(json["gate_mode"], "fail_fast");
    }

    #[tokio::test]
    async fn test_scrape_requires_url() {
        let tmp = TempDir::new().unwrap();
        let (status, _, body) = get(app(SessionScript::markup(TABLE), &tmp), "/scrape").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Missing ?url=");
    }

    #[tokio::test]
    async fn test_scrape_rejects_unknown_strategy() {
        let tmp = TempDir::new().unwrap();
        let (status, _, _) = get(
            app(SessionScript::markup(TABLE), &tmp),
            "/scrape?url=https://example.com/&strategy=screenshot",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_scrape_returns_raw_html_for_generic_url() {
        let tmp = TempDir::new().unwrap();
        let (status, content_type, body) = get(
            app(SessionScript::markup("<p>hello</p>"), &tmp),
            "/scrape?url=https://example.com/page",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/html"));
        assert_eq!(body, b"<p>hello</p>");
    }

    #[tokio::test]
    async fn test_target_returns_extracted_events() {
        let tmp = TempDir::new().unwrap();
        let (status, content_type, body) =
            get(app(SessionScript::markup(TABLE), &tmp), "/targets/bullpen-events").await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("application/json"));
        let doc: EventsDocument = serde_json::from_slice(&body).unwrap();
        assert_eq!(doc.count, 1);
        assert_eq!(doc.events[0].event_name, "Bullpen Bash");
        assert_eq!(doc.events[0].sanction, "Bullpen");
    }

    #[tokio::test]
    async fn test_unknown_target_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let (status, _, _) =
            get(app(SessionScript::markup(TABLE), &tmp), "/targets/nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) =
            get(app(SessionScript::markup(TABLE), &tmp), "/fastpitch/nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fastpitch_returns_raw_markup() {
        let tmp = TempDir::new().unwrap();
        let (status, content_type, body) =
            get(app(SessionScript::markup(TABLE), &tmp), "/fastpitch/bullpen").await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/html"));
        assert_eq!(body, TABLE.as_bytes());
    }

    #[tokio::test]
    async fn test_blocked_maps_to_service_unavailable() {
        let tmp = TempDir::new().unwrap();
        let (status, _, body) =
            get(app(SessionScript::blocked(), &tmp), "/fastpitch/bullpen").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Failed to fetch Bullpen");
        assert_eq!(json["category"], "blocked");
        assert!(json["details"].as_str().unwrap().contains("Blocked"));
    }

    #[tokio::test]
    async fn test_transport_failure_maps_to_bad_gateway() {
        let tmp = TempDir::new().unwrap();
        let (status, _, body) = get(
            app(SessionScript::navigate_failure("net::ERR_CONNECTION_RESET"), &tmp),
            "/scrape?url=https://example.com/",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["category"], "transport");
    }
}
