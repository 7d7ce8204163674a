pub mod admin;
pub mod chat;
pub mod config_view;
pub mod health;
pub mod landing;
pub mod sessions;
pub mod stats;
pub mod streams;
pub mod tools;

use axum::Router;
use axum::routing::{delete, get, post};

use crate::state::GatewayState;

/// The `/api/v1` route tree.
pub fn api_router() -> Router<GatewayState> {
    Router::new()
        .route("/health", get(health::full))
        .route("/health/quick", get(health::quick))
        .route("/stats", get(stats::stats))
        .route("/config", get(config_view::view))
        .route("/chat", post(chat::create))
        .route("/chat/{run_id}", get(chat::info).delete(chat::cancel))
        .route("/chat/{run_id}/cancel", post(chat::cancel))
        .route("/chat/{run_id}/stream", get(streams::events))
        .route("/chat/{run_id}/blocks", get(streams::blocks))
        .route("/sessions", get(sessions::list))
        .route("/sessions/{session_id}", get(sessions::get).delete(sessions::remove))
        .route("/sessions/{session_id}/messages", get(sessions::messages))
        .route("/tools", get(tools::list))
        .route("/tools/{name}/invoke", post(tools::invoke))
        .route("/admin/logs", get(admin::logs))
        .route("/admin/connections", get(admin::connections))
        .route("/admin/connections/{id}", delete(admin::disconnect))
        .route("/admin/runs", get(admin::runs))
        .route("/admin/runs/{run_id}", delete(admin::evict_run))
}
