//! HTTP server configuration settings.

use std::net::SocketAddr;

use serde::Deserialize;

use crate::{
    AuthConfig, ClientIpConfig, CorsConfig, LimitsConfig, LoggingConfig, RateLimitConfig, StaticConfig, TimeoutConfig,
};

/// HTTP server configuration settings.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on. Port 0 binds an
    /// ephemeral port.
    pub listen_address: Option<SocketAddr>,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// CORS configuration.
    pub cors: CorsConfig,
    /// Request rate limiting configuration.
    pub rate_limits: RateLimitConfig,
    /// Static file serving configuration.
    #[serde(rename = "static")]
    pub static_files: StaticConfig,
    /// Request, WebSocket, and shutdown timeouts.
    pub timeouts: TimeoutConfig,
    /// Body size and connection limits.
    pub limits: LimitsConfig,
    /// Request/response logging toggles.
    pub logging: LoggingConfig,
    /// Client IP extraction trust settings.
    pub client_ip: ClientIpConfig,
}
