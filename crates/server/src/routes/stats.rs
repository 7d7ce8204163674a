use axum::Json;
use axum::extract::State;
use serde_json::json;

use crate::state::GatewayState;

/// Public statistics: uptime, connections, runs, memory.
pub async fn stats(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let connections = state.connections.stats();

    Json(json!({
        "version": state.version,
        "uptime_secs": state.uptime_secs(),
        "connections": connections,
        "runs": state.registry.run_count(),
        "memory_rss_bytes": resident_memory_bytes(),
    }))
}

/// Best-effort resident set size; `None` where procfs is unavailable.
fn resident_memory_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;

    Some(resident_pages * 4096)
}
