use axum::{routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use snapshot_engine::{eastern_clock, MarketSession};

use crate::AppState;

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct MarketStatusResponse {
    /// e.g. "Market is currently OPEN"
    pub status: String,
    /// Eastern time, e.g. "10:15:02 AM ET"
    pub time: String,
}

pub fn market_routes() -> Router<AppState> {
    Router::new().route("/api/market-status", get(get_market_status))
}

#[utoipa::path(
    get,
    path = "/api/market-status",
    responses((status = 200, description = "Current US equity session", body = MarketStatusResponse)),
    tag = "Market"
)]
pub async fn get_market_status() -> Json<MarketStatusResponse> {
    let now = Utc::now();
    Json(MarketStatusResponse {
        status: MarketSession::at(now).status_message().to_string(),
        time: eastern_clock(now),
    })
}
