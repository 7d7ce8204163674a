//! Passthrough routes to the tool runtime collaborator.

use std::sync::Arc;

use axum::Extension;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use context::AuthPrincipal;
use serde_json::Value;

use crate::auth::require_admin;
use crate::collab::ToolBroker;
use crate::error::ApiError;
use crate::state::GatewayState;

fn broker(state: &GatewayState) -> Result<Arc<dyn ToolBroker>, ApiError> {
    state
        .tools
        .clone()
        .ok_or_else(|| ApiError::service_unavailable("Tool runtime is not configured"))
}

/// `GET /api/v1/tools`
pub async fn list(State(state): State<GatewayState>) -> Result<Json<Value>, ApiError> {
    let tools = broker(&state)?.list_tools().await?;

    Ok(Json(tools))
}

/// `POST /api/v1/tools/{name}/invoke`. Mutating, requires `*`.
pub async fn invoke(
    State(state): State<GatewayState>,
    Extension(principal): Extension<AuthPrincipal>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state.config.server.auth, &principal)?;

    let arguments: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|_| ApiError::invalid_json())?
    };

    let result = broker(&state)?.invoke_tool(&name, arguments).await?;

    Ok(Json(result))
}
