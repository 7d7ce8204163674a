use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use crate::state::GatewayState;

/// Full health report: every registered check under the shared deadline.
pub async fn full(State(state): State<GatewayState>) -> impl IntoResponse {
    let report = state.health.run().await;

    let status = if report.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(report))
}

/// Instantaneous liveness: reachable means alive.
pub async fn quick(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.uptime_secs(),
    }))
}
