use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use runs::{ConnectorError, RunInfo, RunRequest};

use crate::error::{ApiError, ErrorCode};
use crate::state::GatewayState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    message: String,
    session_id: Option<String>,
    priority: Option<String>,
    context_options: Option<Value>,
}

/// `POST /api/v1/chat`: starts a run and registers it for fan-out.
pub async fn create(State(state): State<GatewayState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let request: ChatRequest = serde_json::from_slice(&body).map_err(|err| {
        log::debug!("Rejected chat body: {err}");
        ApiError::invalid_json()
    })?;

    if request.message.trim().is_empty() {
        return Err(ApiError::validation("message is required").with_details(json!({ "field": "message" })));
    }

    let run_id = Uuid::new_v4().to_string();
    let session_id = request.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let run_request = RunRequest {
        run_id: run_id.clone(),
        session_id: session_id.clone(),
        message: request.message,
        priority: request.priority,
        context_options: request.context_options,
    };

    let handle = state.model.start_run(run_request).await.map_err(map_connector_error)?;

    state.registry.register(handle);

    log::info!("Run {run_id} started for session {session_id}");

    Ok(Json(json!({
        "runId": run_id,
        "sessionId": session_id,
    })))
}

/// `GET /api/v1/chat/{run_id}`: run inspection.
pub async fn info(State(state): State<GatewayState>, Path(run_id): Path<String>) -> Result<Json<Value>, ApiError> {
    let info = state
        .registry
        .get_info(&run_id)
        .ok_or_else(|| ApiError::not_found(format!("run '{run_id}' not found")))?;

    Ok(Json(run_info_json(&info)))
}

/// `DELETE /api/v1/chat/{run_id}` and `POST /api/v1/chat/{run_id}/cancel`.
pub async fn cancel(State(state): State<GatewayState>, Path(run_id): Path<String>) -> Result<Json<Value>, ApiError> {
    if !state.registry.cancel(&run_id) {
        return Err(ApiError::not_found(format!("run '{run_id}' not found")));
    }

    log::info!("Run {run_id} cancellation requested");

    Ok(Json(json!({
        "runId": run_id,
        "status": "cancelling",
    })))
}

pub(crate) fn run_info_json(info: &RunInfo) -> Value {
    json!({
        "runId": info.run_id,
        "sessionId": info.session_id,
        "done": info.done,
        "nextEventId": info.next_event_id,
        "bufferedRange": info.buffered_range.map(|(first, last)| json!({ "first": first, "last": last })),
        "subscribers": info.subscribers,
    })
}

pub(crate) fn map_connector_error(error: ConnectorError) -> ApiError {
    match error {
        ConnectorError::Unavailable => ApiError::service_unavailable("Model connector is not configured"),
        ConnectorError::StartFailed(detail) => {
            log::error!("Model refused to start run: {detail}");
            ApiError::new(ErrorCode::RunStartFailed, "Model refused to start the run")
        }
    }
}
