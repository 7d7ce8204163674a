use axum::extract::State;
use axum::response::Html;

use crate::state::GatewayState;

/// The human landing page.
pub async fn index(State(state): State<GatewayState>) -> Html<String> {
    let version = &state.version;

    Html(format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Switchboard</title></head>
<body>
<h1>Switchboard</h1>
<p>Serving fabric for a multi-channel AI assistant. Version {version}.</p>
<ul>
<li><a href="/api/v1/health">health</a></li>
<li><a href="/api/v1/stats">stats</a></li>
<li><code>POST /api/v1/chat</code> starts a run; <code>GET /api/v1/chat/&lt;runId&gt;/stream</code> streams it.</li>
</ul>
</body>
</html>
"#
    ))
}
