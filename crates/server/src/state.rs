use std::sync::{Arc, RwLock};
use std::time::Instant;

use blocks::ProfileRegistry;
use config::Config;
use runs::{ModelConnector, RunRegistry};
use tokio_util::sync::CancellationToken;

use crate::admission::ConnectionTracker;
use crate::collab::{SessionStore, ToolBroker};
use crate::health::HealthRegistry;
use crate::hooks::GatewayEvents;
use crate::logbuf::LogBuffer;

/// Everything the route handlers and the WebSocket loop share.
#[derive(Clone)]
pub struct GatewayState {
    inner: Arc<GatewayStateInner>,
}

pub struct GatewayStateInner {
    pub config: Config,
    pub version: String,
    pub registry: RunRegistry,
    pub profiles: RwLock<ProfileRegistry>,
    pub connections: ConnectionTracker,
    pub model: Arc<dyn ModelConnector>,
    pub sessions: Option<Arc<dyn SessionStore>>,
    pub tools: Option<Arc<dyn ToolBroker>>,
    pub health: HealthRegistry,
    pub hooks: GatewayEvents,
    pub log_buffer: LogBuffer,
    pub started_at: Instant,
    /// Cancelled when shutdown begins; WebSocket loops close with 1001.
    pub shutdown: CancellationToken,
}

impl GatewayState {
    /// Wraps the assembled state for cheap cloning into handlers.
    pub fn new(inner: GatewayStateInner) -> Self {
        Self { inner: Arc::new(inner) }
    }

    /// Seconds since the gateway was assembled.
    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }
}

impl std::ops::Deref for GatewayState {
    type Target = GatewayStateInner;

    fn deref(&self) -> &GatewayStateInner {
        &self.inner
    }
}
