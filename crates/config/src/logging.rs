use serde::Deserialize;

/// Request/response logging toggles.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log one line per incoming request.
    pub requests: bool,
    /// Log one line per response with status and latency.
    pub responses: bool,
    /// Log handler errors.
    pub errors: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            requests: true,
            responses: false,
            errors: true,
        }
    }
}
