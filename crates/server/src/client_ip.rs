use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use config::ClientIpConfig;
use http::{HeaderMap, Request};

/// Resolves the client IP: `X-Forwarded-For` (first entry) when trusted,
/// then `X-Real-IP`, then the socket peer address.
pub fn client_ip(config: &ClientIpConfig, headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    if config.x_forwarded_for
        && let Some(ip) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse().ok())
    {
        return ip;
    }

    if config.x_real_ip
        && let Some(ip) = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    {
        return ip;
    }

    peer.map(|addr| addr.ip()).unwrap_or(IpAddr::from([0, 0, 0, 0]))
}

/// [`client_ip`] over a full request, using the socket info axum attaches.
pub fn extract_client_ip<B>(config: &ClientIpConfig, req: &Request<B>) -> IpAddr {
    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0);

    client_ip(config, req.headers(), peer)
}
