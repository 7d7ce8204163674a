use serde::Deserialize;

/// Configuration for extracting the client IP from proxy headers.
///
/// Lookup order is `X-Forwarded-For` (first entry), then `X-Real-IP`, then
/// the socket peer address.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientIpConfig {
    /// Whether the X-Forwarded-For header is trusted.
    pub x_forwarded_for: bool,
    /// Whether the X-Real-IP header is trusted.
    pub x_real_ip: bool,
}

impl Default for ClientIpConfig {
    fn default() -> Self {
        Self {
            x_forwarded_for: true,
            x_real_ip: true,
        }
    }
}
