//! Passthrough routes to the session store collaborator.

use std::sync::Arc;

use axum::Extension;
use axum::Json;
use axum::extract::{Path, State};
use context::AuthPrincipal;
use serde_json::{Value, json};

use crate::auth::require_admin;
use crate::collab::SessionStore;
use crate::error::ApiError;
use crate::state::GatewayState;

fn store(state: &GatewayState) -> Result<Arc<dyn SessionStore>, ApiError> {
    state
        .sessions
        .clone()
        .ok_or_else(|| ApiError::service_unavailable("Session store is not configured"))
}

/// `GET /api/v1/sessions`
pub async fn list(State(state): State<GatewayState>) -> Result<Json<Value>, ApiError> {
    let sessions = store(&state)?.list_sessions().await?;

    Ok(Json(sessions))
}

/// `GET /api/v1/sessions/{session_id}`
pub async fn get(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = store(&state)?.get_session(&session_id).await?;

    Ok(Json(session))
}

/// `DELETE /api/v1/sessions/{session_id}`. Mutating, requires `*`.
pub async fn remove(
    State(state): State<GatewayState>,
    Extension(principal): Extension<AuthPrincipal>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state.config.server.auth, &principal)?;

    store(&state)?.delete_session(&session_id).await?;

    Ok(Json(json!({ "sessionId": session_id, "deleted": true })))
}

/// `GET /api/v1/sessions/{session_id}/messages`
pub async fn messages(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let messages = store(&state)?.session_messages(&session_id).await?;

    Ok(Json(messages))
}
