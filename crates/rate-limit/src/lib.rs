//! Request rate limiting for the gateway.
//!
//! Process-local fixed-quota limiting, keyed by client IP with an optional
//! global quota on top. The manager is the pluggable seam: the HTTP layer
//! only ever calls [`RateLimitManager::check_request`].

#![deny(missing_docs)]

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use config::RateLimitConfig;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

/// Raised when a request is not allowed to proceed.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The per-client or global quota is exhausted.
    #[error("Rate limit exceeded")]
    Exceeded,
}

/// A rate limit decision request.
#[derive(Debug, Clone)]
pub struct RateLimitRequest {
    /// The client IP the quota is keyed on.
    pub ip: IpAddr,
}

impl RateLimitRequest {
    /// Starts building a rate limit request.
    pub fn builder() -> RateLimitRequestBuilder {
        RateLimitRequestBuilder { ip: None }
    }
}

/// Builder for [`RateLimitRequest`].
#[derive(Debug, Default)]
pub struct RateLimitRequestBuilder {
    ip: Option<IpAddr>,
}

impl RateLimitRequestBuilder {
    /// Sets the client IP.
    pub fn ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Finalizes the request. Falls back to the unspecified IPv4 address so
    /// a missing peer address still shares one bucket instead of bypassing
    /// the limiter.
    pub fn build(self) -> RateLimitRequest {
        RateLimitRequest {
            ip: self.ip.unwrap_or(IpAddr::from([0, 0, 0, 0])),
        }
    }
}

type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Checks requests against the configured quotas.
pub struct RateLimitManager {
    per_ip: KeyedLimiter,
}

impl RateLimitManager {
    /// Creates a manager from the configured quota. The configured limit is
    /// both the sustained rate per interval and the burst allowance.
    pub fn new(config: RateLimitConfig) -> Self {
        let limit = NonZeroU32::new(config.default_limit.max(1)).unwrap_or(NonZeroU32::MIN);

        let replenish_interval = config
            .interval
            .checked_div(limit.get())
            .filter(|interval| !interval.is_zero())
            .unwrap_or(Duration::from_millis(1));

        let quota = Quota::with_period(replenish_interval)
            .unwrap_or_else(|| Quota::per_second(limit))
            .allow_burst(limit);

        log::debug!(
            "Rate limiter configured: {} requests per {:?}",
            config.default_limit,
            config.interval
        );

        Self {
            per_ip: RateLimiter::keyed(quota),
        }
    }

    /// Checks whether the request may proceed, consuming one quota cell.
    pub async fn check_request(&self, request: &RateLimitRequest) -> Result<(), RateLimitError> {
        self.per_ip.check_key(&request.ip).map_err(|_| RateLimitError::Exceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(limit: u32, interval: Duration) -> RateLimitManager {
        RateLimitManager::new(RateLimitConfig {
            enabled: true,
            default_limit: limit,
            interval,
        })
    }

    #[tokio::test]
    async fn allows_up_to_the_configured_burst() {
        let manager = manager(3, Duration::from_secs(60));
        let request = RateLimitRequest::builder().ip(IpAddr::from([10, 0, 0, 1])).build();

        for _ in 0..3 {
            manager.check_request(&request).await.unwrap();
        }

        assert!(matches!(
            manager.check_request(&request).await,
            Err(RateLimitError::Exceeded)
        ));
    }

    #[tokio::test]
    async fn quotas_are_keyed_per_ip() {
        let manager = manager(1, Duration::from_secs(60));

        let first = RateLimitRequest::builder().ip(IpAddr::from([10, 0, 0, 1])).build();
        let second = RateLimitRequest::builder().ip(IpAddr::from([10, 0, 0, 2])).build();

        manager.check_request(&first).await.unwrap();
        manager.check_request(&second).await.unwrap();

        assert!(manager.check_request(&first).await.is_err());
    }
}
