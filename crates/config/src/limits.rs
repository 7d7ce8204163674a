use serde::Deserialize;

/// Body size and connection admission limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum accepted request body size in bytes. Exceeding it aborts the
    /// request with a 413.
    pub max_body_size: usize,
    /// Maximum concurrently tracked connections across all transports.
    pub max_connections: usize,
    /// Maximum concurrently tracked connections per client IP.
    pub max_connections_per_ip: usize,
    /// Maximum run subscriptions on a single WebSocket connection.
    pub max_ws_subscriptions_per_connection: usize,
    /// Outgoing frame queue depth per WebSocket connection. Overflow means a
    /// slow consumer and closes the connection with code 1013.
    pub max_ws_queued_frames: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024,
            max_connections: 1024,
            max_connections_per_ip: 32,
            max_ws_subscriptions_per_connection: 16,
            max_ws_queued_frames: 256,
        }
    }
}
