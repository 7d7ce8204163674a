//! Admin surface: recent logs, the connection table, and run management.

use axum::Extension;
use axum::Json;
use axum::extract::{Path, Query, State};
use context::AuthPrincipal;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::require_admin;
use crate::error::ApiError;
use crate::routes::chat::run_info_json;
use crate::state::GatewayState;

const DEFAULT_LOG_LIMIT: usize = 100;
const MAX_LOG_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    limit: Option<usize>,
}

/// `GET /api/v1/admin/logs?limit=`: the in-memory log ring, oldest first.
pub async fn logs(
    State(state): State<GatewayState>,
    Extension(principal): Extension<AuthPrincipal>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state.config.server.auth, &principal)?;

    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);
    let entries = state.log_buffer.recent(limit);

    Ok(Json(json!({ "entries": entries })))
}

/// `GET /api/v1/admin/connections`
pub async fn connections(
    State(state): State<GatewayState>,
    Extension(principal): Extension<AuthPrincipal>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state.config.server.auth, &principal)?;

    Ok(Json(json!({
        "stats": state.connections.stats(),
        "connections": state.connections.list(),
    })))
}

/// `DELETE /api/v1/admin/connections/{id}`: asks one connection to go.
pub async fn disconnect(
    State(state): State<GatewayState>,
    Extension(principal): Extension<AuthPrincipal>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state.config.server.auth, &principal)?;

    if !state.connections.disconnect(id) {
        return Err(ApiError::not_found(format!("connection {id} not found")));
    }

    Ok(Json(json!({ "id": id, "disconnecting": true })))
}

/// `GET /api/v1/admin/runs`
pub async fn runs(
    State(state): State<GatewayState>,
    Extension(principal): Extension<AuthPrincipal>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state.config.server.auth, &principal)?;

    let runs: Vec<Value> = state.registry.list_runs().iter().map(run_info_json).collect();

    Ok(Json(json!({ "runs": runs })))
}

/// `DELETE /api/v1/admin/runs/{run_id}`: cancels and evicts immediately.
pub async fn evict_run(
    State(state): State<GatewayState>,
    Extension(principal): Extension<AuthPrincipal>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state.config.server.auth, &principal)?;

    if !state.registry.evict(&run_id) {
        return Err(ApiError::not_found(format!("run '{run_id}' not found")));
    }

    Ok(Json(json!({ "runId": run_id, "evicted": true })))
}
