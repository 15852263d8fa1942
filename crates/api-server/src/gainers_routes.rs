use analysis_core::{ProfitTarget, RankTier, RiskNote, SuggestedAction, SymbolSnapshot};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use snapshot_engine::{CacheError, CacheStatus};

use crate::{ApiResponse, AppError, AppState};

/// One row of the top gainers table
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GainerRow {
    pub ticker: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: Option<f64>,
    pub volume: f64,
    pub rsi: Option<f64>,
    pub rank: RankTier,
    pub action: SuggestedAction,
    pub risk_note: RiskNote,
    pub atr_stop: Option<f64>,
    pub profit_target: Option<ProfitTarget>,
}

impl From<&SymbolSnapshot> for GainerRow {
    fn from(s: &SymbolSnapshot) -> Self {
        Self {
            ticker: s.ticker.clone(),
            price: s.current_price,
            change: s.change_absolute,
            change_percent: s.change_percent,
            volume: s.volume,
            rsi: s.indicators.rsi,
            rank: s.rank_tier,
            action: s.suggested_action,
            risk_note: s.risk_note.clone(),
            atr_stop: s.stop_price,
            profit_target: s.profit_target,
        }
    }
}

fn cache_err(e: CacheError) -> AppError {
    AppError::with_status(StatusCode::SERVICE_UNAVAILABLE, anyhow::anyhow!(e))
}

pub fn gainers_routes() -> Router<AppState> {
    Router::new()
        .route("/api/top-gainers", get(get_top_gainers))
        .route("/api/top-gainers/status", get(get_cache_status))
}

#[utoipa::path(
    get,
    path = "/api/top-gainers",
    responses(
        (status = 200, description = "Top gainers, biggest absolute change first. `x-cache` is `fresh` or `stale`", body = Vec<GainerRow>),
        (status = 503, description = "No snapshot available yet, or the service is misconfigured")
    ),
    tag = "Gainers"
)]
pub async fn get_top_gainers(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let read = state.cache()?.get().await.map_err(cache_err)?;

    let rows: Vec<GainerRow> = read.entry.snapshots.iter().map(GainerRow::from).collect();
    let cache_header = if read.stale { "stale" } else { "fresh" };

    Ok(([("x-cache", cache_header)], Json(rows)))
}

#[utoipa::path(
    get,
    path = "/api/top-gainers/status",
    responses((status = 200, description = "Cache age and last refresh outcome", body = CacheStatus)),
    tag = "Gainers"
)]
pub async fn get_cache_status(State(state): State<AppState>) -> Result<Json<ApiResponse<CacheStatus>>, AppError> {
    let status = state.cache()?.status().await;
    Ok(Json(ApiResponse::success(status)))
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use crate::{build_router, config::ServerConfig, AppState, GainersBackend};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_top_gainers_rows() {
        let app = ready_app(&[("A", 105.0, 100.0, 60), ("B", 99.0, 100.0, 60), ("C", 52.0, 50.0, 5)]);
        let (status, headers, body) = send(app, "/api/top-gainers").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get("x-cache").unwrap(), "fresh");

        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["ticker"], "A");
        assert_eq!(rows[0]["change"], 5.0);
        assert!(rows[0]["changePercent"].is_number());
        assert!(rows[0]["atrStop"].is_number());
        assert!(rows[0]["profitTarget"]["low"].is_number());
        assert!(rows[0]["riskNote"]["factor"].is_string());

        assert_eq!(rows[1]["ticker"], "C");
        assert_eq!(rows[1]["rank"], "N/A");
        assert_eq!(rows[1]["action"], "Watch");
        assert!(rows[1]["rsi"].is_null());
        assert!(rows[1]["atrStop"].is_null());
    }

    #[tokio::test]
    async fn test_cold_start_failure_is_503() {
        let app = failing_app();
        let (status, _, body) = send(app, "/api/top-gainers").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_misconfigured_backend_is_503() {
        let state = AppState {
            gainers: GainersBackend::Misconfigured("POLYGON_API_KEY is not set".into()),
        };
        let app = build_router(state, &ServerConfig::default());

        let (status, _, body) = send(app.clone(), "/api/top-gainers").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("POLYGON_API_KEY"));

        let (status, _, _) = send(app, "/api/top-gainers/status").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_status_after_refresh() {
        let app = ready_app(&[("A", 105.0, 100.0, 60)]);
        send(app.clone(), "/api/top-gainers").await;

        let (status, _, body) = send(app, "/api/top-gainers/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["hasEntry"], true);
        assert_eq!(body["data"]["refreshesAttempted"], 1);
        assert_eq!(body["data"]["lastRefreshFailed"], false);
    }
}
