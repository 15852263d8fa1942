pub mod config;
pub mod gainers_routes;
pub mod market_routes;

use anyhow::Context;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use polygon_client::{PolygonClient, PolygonConfig};
use serde::Serialize;
use snapshot_engine::{EngineConfig, SnapshotBuilder, SnapshotCache};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::config::ServerConfig;

/// Where top-gainer reads are served from. A deployment without usable
/// credentials still starts, but every gainers read answers 503.
#[derive(Clone)]
pub enum GainersBackend {
    Ready(SnapshotCache),
    Misconfigured(Arc<str>),
}

#[derive(Clone)]
pub struct AppState {
    pub gainers: GainersBackend,
}

impl AppState {
    pub fn cache(&self) -> Result<&SnapshotCache, AppError> {
        match &self.gainers {
            GainersBackend::Ready(cache) => Ok(cache),
            GainersBackend::Misconfigured(reason) => Err(AppError::with_status(
                StatusCode::SERVICE_UNAVAILABLE,
                anyhow::anyhow!("Service misconfigured: {reason}"),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Handler error rendered as `{"error": "..."}`. Converted errors are 500s.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{}: {:#}", self.status, self.error);
        }
        let body = Json(serde_json::json!({ "error": self.error.to_string() }));
        (self.status, body).into_response()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        gainers_routes::get_top_gainers,
        gainers_routes::get_cache_status,
        market_routes::get_market_status,
        health,
    ),
    components(schemas(
        gainers_routes::GainerRow,
        market_routes::MarketStatusResponse,
        snapshot_engine::CacheStatus,
        analysis_core::RankTier,
        analysis_core::SuggestedAction,
        analysis_core::RiskFactor,
        analysis_core::RiskNote,
        analysis_core::ProfitTarget,
    )),
    tags(
        (name = "Gainers", description = "Cached top gainers snapshot"),
        (name = "Market", description = "US equity session clock"),
    )
)]
pub struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Process is up")),
    tag = "Market"
)]
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = if config.cors_allow_any {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(gainers_routes::gainers_routes())
        .merge(market_routes::market_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
}

/// Builds the gainers backend from the environment. A missing or blank
/// Polygon key yields `Misconfigured` instead of failing startup.
pub fn gainers_backend(polygon: PolygonConfig, engine: EngineConfig) -> GainersBackend {
    match PolygonClient::new(polygon) {
        Ok(client) => {
            let client = Arc::new(client);
            let builder = SnapshotBuilder::new(client.clone(), client, engine);
            GainersBackend::Ready(SnapshotCache::new(builder))
        }
        Err(e) => {
            tracing::error!("Top gainers disabled: {}", e);
            GainersBackend::Misconfigured(e.to_string().into())
        }
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let server_config = ServerConfig::from_env()?;
    let engine_config = EngineConfig::from_env().context("Invalid top gainers configuration")?;
    let polygon_config = PolygonConfig::from_env().context("Invalid Polygon configuration")?;

    tracing::info!(
        "Top gainers: top {} of up to {} symbols, TTL {}s",
        engine_config.top_n,
        engine_config.discovery_limit,
        engine_config.cache_ttl.as_secs()
    );

    let gainers = gainers_backend(polygon_config, engine_config);

    // Warm the cache so the first request does not pay for a full refresh.
    if let GainersBackend::Ready(cache) = &gainers {
        let cache = cache.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.get().await {
                tracing::warn!("Initial top gainers refresh failed: {}", e);
            }
        });
    }

    let app = build_router(AppState { gainers }, &server_config);

    let listener = tokio::net::TcpListener::bind(server_config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", server_config.bind_addr))?;
    tracing::info!("API server listening on {}", server_config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
pub(crate) mod test_support;
