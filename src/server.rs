//! HTTP API
//!
//! Thin axum layer over [`Scraper`]: one route per pipeline, JSON out.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::scraper::{Scraper, SourceRequest};
use crate::types::{DetailRecord, HomePage, SourceResult};

#[derive(Clone)]
pub struct AppState {
    pub scraper: Arc<Scraper>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeParams {
    season_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerParams {
    episode_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceParams {
    server_id: Option<String>,
    episode_id: Option<String>,
    debug: Option<String>,
}

fn flag(v: Option<&str>) -> bool {
    matches!(v.map(str::trim), Some("1" | "true" | "yes"))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/home", get(home))
        .route("/search", get(search))
        .route("/movie/:id", get(detail))
        .route("/movie/:id/seasons", get(seasons))
        .route("/movie/:id/episodes", get(episodes))
        .route("/movie/:id/servers", get(servers))
        .route("/movie/:id/sources", get(sources))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION"),
        "cacheSize": state.scraper.cache_size(),
    }))
}

async fn home(State(state): State<AppState>) -> Result<Json<HomePage>, ApiError> {
    Ok(Json(state.scraper.home().await?))
}

async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<Value>, ApiError> {
    let items = state
        .scraper
        .search(params.q.as_deref().unwrap_or_default())
        .await
        .map_err(|e| e.with_message("Failed to search"))?;
    Ok(Json(json!({ "items": items })))
}

async fn detail(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<DetailRecord>, ApiError> {
    let detail = state.scraper.detail(&id).await.map_err(|e| e.with_message("Failed to fetch movie details"))?;
    Ok(Json(detail))
}

async fn seasons(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let seasons = state.scraper.seasons(&id).await.map_err(|e| e.with_message("Failed to fetch seasons"))?;
    Ok(Json(json!({ "seasons": seasons })))
}

async fn episodes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<EpisodeParams>,
) -> Result<Json<Value>, ApiError> {
    debug!(id, season_id = ?params.season_id, "episodes");
    let episodes = state
        .scraper
        .episodes(params.season_id.as_deref())
        .await
        .map_err(|e| e.with_message("Failed to fetch episodes"))?;
    Ok(Json(json!({ "episodes": episodes })))
}

async fn servers(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ServerParams>,
) -> Result<Json<Value>, ApiError> {
    debug!(id, episode_id = ?params.episode_id, "servers");
    let servers = state
        .scraper
        .servers(params.episode_id.as_deref())
        .await
        .map_err(|e| e.with_message("Failed to fetch servers"))?;
    Ok(Json(json!({ "servers": servers })))
}

async fn sources(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SourceParams>,
) -> Result<Json<SourceResult>, ApiError> {
    debug!(id, server_id = ?params.server_id, "sources");
    let req = SourceRequest {
        server_id: params.server_id,
        episode_id: params.episode_id,
        debug: flag(params.debug.as_deref()),
    };
    let result = state.scraper.sources(&req).await.map_err(|e| e.with_message("Failed to fetch video sources"))?;
    Ok(Json(result))
}

/// Serve until ctrl-c.
pub async fn run(scraper: Scraper, listen: &str) -> Result<()> {
    let addr: SocketAddr = listen.parse().context("Invalid listen address")?;
    let app = create_router(AppState { scraper: Arc::new(scraper) });

    let listener = TcpListener::bind(&addr).await.context("Failed to bind HTTP server")?;
    info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("HTTP server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use httpmock::prelude::*;
    use tower::ServiceExt;

    fn app_for(server: &MockServer) -> Router {
        let scraper = Scraper::new(Config::with_base_url(server.base_url())).unwrap();
        create_router(AppState { scraper: Arc::new(scraper) })
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let resp = app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn debug_flag_parsing() {
        assert!(flag(Some("1")));
        assert!(flag(Some("true")));
        assert!(!flag(Some("0")));
        assert!(!flag(None));
    }

    #[tokio::test]
    async fn health_reports_version() {
        let site = MockServer::start_async().await;
        let (status, body) = get_json(app_for(&site), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["cacheSize"], 0);
    }

    #[tokio::test]
    async fn sources_without_server_id_is_rejected_before_any_fetch() {
        let site = MockServer::start_async().await;
        let any = site
            .mock_async(|when, then| {
                when.any_request();
                then.status(200);
            })
            .await;

        for uri in ["/movie/abc/sources", "/movie/abc/sources?serverId=%20&episodeId=1"] {
            let (status, body) = get_json(app_for(&site), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], "serverId is required");
        }
        any.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn episodes_and_servers_require_their_ids() {
        let site = MockServer::start_async().await;
        let any = site
            .mock_async(|when, then| {
                when.any_request();
                then.status(200);
            })
            .await;

        let (status, body) = get_json(app_for(&site), "/movie/900/episodes").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "seasonId is required");

        let (status, body) = get_json(app_for(&site), "/movie/900/servers?episodeId=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "episodeId is required");
        any.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn search_requires_query() {
        let site = MockServer::start_async().await;
        let (status, body) = get_json(app_for(&site), "/search").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "q is required");
    }

    #[tokio::test]
    async fn detail_upstream_failure_is_a_500() {
        let site = MockServer::start_async().await;
        site.mock_async(|when, then| {
            when.method(GET).path("/watch-movie/watch-42");
            then.status(502).body("bad gateway");
        })
        .await;

        let (status, body) = get_json(app_for(&site), "/movie/42").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to fetch movie details");
        assert!(body.get("title").is_none());
    }

    #[tokio::test]
    async fn seasons_are_wrapped() {
        let site = MockServer::start_async().await;
        site.mock_async(|when, then| {
            when.method(GET).path("/ajax/season/list/900");
            then.status(200).body(r#"<div class="dropdown-menu"><a class="dropdown-item ss-item" data-id="11">Season 1</a></div>"#);
        })
        .await;

        let (status, body) = get_json(app_for(&site), "/movie/900/seasons").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["seasons"][0]["id"], "11");
        assert_eq!(body["seasons"][0]["title"], "Season 1");
    }
}
