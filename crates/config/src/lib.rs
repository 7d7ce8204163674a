//! Switchboard configuration structures mapping the switchboard.toml file.

#![deny(missing_docs)]

mod auth;
mod client_ip;
mod cors;
mod limits;
mod loader;
mod logging;
mod profiles;
mod rate_limit;
mod registry;
mod server;
mod static_files;
mod timeouts;

use std::collections::BTreeMap;
use std::path::Path;

pub use auth::{AuthConfig, AuthMode, CredentialConfig};
pub use client_ip::ClientIpConfig;
pub use cors::CorsConfig;
pub use limits::LimitsConfig;
pub use logging::LoggingConfig;
pub use profiles::{DeliveryMode, ProfileConfig};
pub use rate_limit::RateLimitConfig;
pub use registry::RegistryConfig;
use serde::Deserialize;
pub use server::ServerConfig;
pub use static_files::StaticConfig;
pub use timeouts::TimeoutConfig;

/// Main configuration structure for the Switchboard gateway.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// Run registry buffering and retention settings.
    pub registry: RegistryConfig,
    /// Channel profile registrations and overrides, merged over the built-in
    /// set at startup.
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates invariants that the type system cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }

    /// The non-secret configuration view served by `/api/v1/config`.
    pub fn redacted_view(&self) -> serde_json::Value {
        loader::redacted_view(self)
    }
}
