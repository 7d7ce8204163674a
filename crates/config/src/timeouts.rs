use std::time::Duration;

use serde::Deserialize;

/// Request, WebSocket, and shutdown timeouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Bounds one HTTP request from headers-complete to response-sent.
    /// Streaming responses (SSE) are exempt.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub request: Duration,
    /// Upper bound on WebSocket ping/pong silence before the connection is
    /// terminated. The heartbeat interval is half of this, clamped to at
    /// least five seconds.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub websocket: Duration,
    /// Bounds graceful shutdown; remaining connections are force-terminated
    /// afterwards.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub shutdown: Duration,
    /// Connections idle past this budget are disconnected by the sweeper.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub idle_connection: Duration,
    /// How often the idle sweeper scans the connection table.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub idle_sweep_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            websocket: Duration::from_secs(60),
            shutdown: Duration::from_secs(10),
            idle_connection: Duration::from_secs(300),
            idle_sweep_interval: Duration::from_secs(60),
        }
    }
}
