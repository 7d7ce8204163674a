use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Static file serving configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticConfig {
    /// Whether static files are served.
    pub enabled: bool,
    /// Directory served at the root path.
    pub root: PathBuf,
    /// Index file name served for directory requests.
    pub index: String,
    /// `Cache-Control: max-age` applied to responses.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub max_age: Duration,
    /// Whether precompressed gzip variants are served when present.
    pub compression: bool,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: PathBuf::from("./public"),
            index: "index.html".to_string(),
            max_age: Duration::from_secs(3600),
            compression: false,
        }
    }
}
