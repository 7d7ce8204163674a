use std::time::Duration;

use serde::Deserialize;

/// CORS configuration for browser-facing deployments.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Whether the CORS layer is installed.
    pub enabled: bool,
    /// Allowed origins. `*` allows any origin.
    pub origins: Vec<String>,
    /// Allowed methods.
    pub methods: Vec<String>,
    /// Allowed request headers.
    pub headers: Vec<String>,
    /// Whether credentialed requests are allowed. Incompatible with a `*`
    /// origin.
    pub credentials: bool,
    /// Preflight cache lifetime.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub max_age: Duration,
}

impl CorsConfig {
    /// Whether any origin is allowed.
    pub fn allows_any_origin(&self) -> bool {
        self.origins.iter().any(|origin| origin == "*")
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origins: vec!["*".to_string()],
            methods: ["GET", "POST", "DELETE", "OPTIONS"].map(String::from).to_vec(),
            headers: ["content-type", "authorization", "x-api-key", "last-event-id"]
                .map(String::from)
                .to_vec(),
            credentials: false,
            max_age: Duration::from_secs(3600),
        }
    }
}
