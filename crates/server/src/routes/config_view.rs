use axum::Json;
use axum::extract::State;

use crate::state::GatewayState;

/// The non-secret configuration view. Credential values never appear here;
/// only their count does.
pub async fn view(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(state.config.redacted_view())
}
