use std::time::Duration;

use serde::Deserialize;

/// Request rate limiting configuration.
///
/// The policy itself is deliberately simple: a fixed request quota per client
/// IP within an interval. Anything richer plugs in behind the same layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Whether the rate limit layer is installed.
    pub enabled: bool,
    /// Requests allowed per client within one interval.
    pub default_limit: u32,
    /// The quota replenishment window.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_limit: 120,
            interval: Duration::from_secs(60),
        }
    }
}
