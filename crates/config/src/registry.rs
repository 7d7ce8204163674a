use std::time::Duration;

use serde::Deserialize;

/// Run registry buffering and retention settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Number of events kept per run for replay; oldest are evicted first.
    pub buffer_size: usize,
    /// How long a finished run stays available to late subscribers before
    /// eviction.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub retention: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            buffer_size: 200,
            retention: Duration::from_secs(600),
        }
    }
}
