//! Connection admission control: global and per-IP caps, the connection
//! table, and idle cleanup.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use config::LimitsConfig;
use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::hooks::{GatewayEvent, GatewayEvents};

/// The transport behind a tracked connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// A plain request/response exchange.
    Http,
    /// A long-lived event-stream response.
    Sse,
    /// An upgraded WebSocket.
    Websocket,
}

/// Raised when an accept would exceed a cap.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdmissionError {
    /// The global connection cap is reached.
    #[error("connection limit reached")]
    TotalLimit,

    /// The per-IP connection cap is reached.
    #[error("per-IP connection limit reached")]
    PerIpLimit,
}

struct ConnectionEntry {
    kind: ConnectionKind,
    ip: IpAddr,
    subject: Option<String>,
    opened_at: Instant,
    last_activity: Mutex<Instant>,
    token: CancellationToken,
}

/// A serializable snapshot of one tracked connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Connection id.
    pub id: u64,
    /// Transport kind.
    pub kind: ConnectionKind,
    /// Remote address.
    pub ip: String,
    /// Authenticated subject, when any.
    pub subject: Option<String>,
    /// Seconds since the connection was admitted.
    pub age_secs: u64,
    /// Seconds since the last observed activity.
    pub idle_secs: u64,
}

/// Aggregate connection counts.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConnectionStats {
    /// All tracked connections.
    pub total: usize,
    /// Plain HTTP exchanges in flight.
    pub http: usize,
    /// Open SSE streams.
    pub sse: usize,
    /// Open WebSockets.
    pub websocket: usize,
}

struct TrackerInner {
    connections: DashMap<u64, ConnectionEntry>,
    per_ip: DashMap<IpAddr, usize>,
    next_id: AtomicU64,
    max_connections: usize,
    max_per_ip: usize,
    hooks: GatewayEvents,
}

/// The connection table. Every accept across transports goes through
/// [`ConnectionTracker::try_acquire`]; the returned guard removes the entry
/// on drop.
#[derive(Clone)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

impl ConnectionTracker {
    /// Creates a tracker with the configured caps.
    pub fn new(limits: &LimitsConfig, hooks: GatewayEvents) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                connections: DashMap::new(),
                per_ip: DashMap::new(),
                next_id: AtomicU64::new(1),
                max_connections: limits.max_connections,
                max_per_ip: limits.max_connections_per_ip,
                hooks,
            }),
        }
    }

    /// Admits a connection or reports the violated cap.
    pub fn try_acquire(&self, kind: ConnectionKind, ip: IpAddr) -> Result<ConnectionGuard, AdmissionError> {
        let inner = &self.inner;

        if inner.connections.len() >= inner.max_connections {
            return Err(AdmissionError::TotalLimit);
        }

        {
            let mut count = inner.per_ip.entry(ip).or_insert(0);

            if *count >= inner.max_per_ip {
                return Err(AdmissionError::PerIpLimit);
            }

            *count += 1;
        }

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let token = CancellationToken::new();

        inner.connections.insert(
            id,
            ConnectionEntry {
                kind,
                ip,
                subject: None,
                opened_at: now,
                last_activity: Mutex::new(now),
                token: token.clone(),
            },
        );

        inner.hooks.emit(GatewayEvent::Connection { id, kind, ip });

        Ok(ConnectionGuard {
            inner: Arc::downgrade(inner),
            id,
            token,
        })
    }

    /// Whether one more connection from `ip` would be admitted.
    pub fn would_admit(&self, ip: IpAddr) -> bool {
        let inner = &self.inner;

        inner.connections.len() < inner.max_connections
            && inner.per_ip.get(&ip).map(|count| *count).unwrap_or(0) < inner.max_per_ip
    }

    /// Records the authenticated subject for a connection.
    pub fn set_subject(&self, id: u64, subject: &str) {
        if let Some(mut entry) = self.inner.connections.get_mut(&id) {
            entry.subject = Some(subject.to_string());
        }
    }

    /// Aggregate counts.
    pub fn stats(&self) -> ConnectionStats {
        let mut stats = ConnectionStats {
            total: 0,
            http: 0,
            sse: 0,
            websocket: 0,
        };

        for entry in self.inner.connections.iter() {
            stats.total += 1;

            match entry.kind {
                ConnectionKind::Http => stats.http += 1,
                ConnectionKind::Sse => stats.sse += 1,
                ConnectionKind::Websocket => stats.websocket += 1,
            }
        }

        stats
    }

    /// Snapshots every tracked connection.
    pub fn list(&self) -> Vec<ConnectionInfo> {
        let now = Instant::now();

        let mut infos: Vec<ConnectionInfo> = self
            .inner
            .connections
            .iter()
            .map(|entry| {
                let idle = entry
                    .last_activity
                    .lock()
                    .map(|last| now.duration_since(*last))
                    .unwrap_or_default();

                ConnectionInfo {
                    id: *entry.key(),
                    kind: entry.kind,
                    ip: entry.ip.to_string(),
                    subject: entry.subject.clone(),
                    age_secs: now.duration_since(entry.opened_at).as_secs(),
                    idle_secs: idle.as_secs(),
                }
            })
            .collect();

        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Requests disconnection of one connection. The holder observes its
    /// token and tears the transport down. Returns whether the id was known.
    pub fn disconnect(&self, id: u64) -> bool {
        match self.inner.connections.get(&id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels connections idle past `budget`. Returns how many were asked
    /// to go.
    pub fn sweep_idle(&self, budget: Duration) -> usize {
        let now = Instant::now();
        let mut swept = 0;

        for entry in self.inner.connections.iter() {
            let idle = entry
                .last_activity
                .lock()
                .map(|last| now.duration_since(*last))
                .unwrap_or_default();

            if idle > budget {
                entry.token.cancel();
                swept += 1;
            }
        }

        if swept > 0 {
            log::debug!("Idle sweep cancelled {swept} connections");
        }

        swept
    }
}

/// Membership in the connection table. Dropping removes the entry and
/// releases the per-IP slot.
pub struct ConnectionGuard {
    inner: Weak<TrackerInner>,
    id: u64,
    token: CancellationToken,
}

impl ConnectionGuard {
    /// The connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancelled when the gateway wants this connection gone (admin
    /// disconnect, idle sweep, shutdown).
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Marks the connection as active now.
    pub fn touch(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        if let Some(entry) = inner.connections.get(&self.id)
            && let Ok(mut last) = entry.last_activity.lock()
        {
            *last = Instant::now();
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        if let Some((_, entry)) = inner.connections.remove(&self.id) {
            if let Some(mut count) = inner.per_ip.get_mut(&entry.ip) {
                *count = count.saturating_sub(1);
            }

            inner.per_ip.remove_if(&entry.ip, |_, count| *count == 0);
            inner.hooks.emit(GatewayEvent::Disconnection { id: self.id });
        }
    }
}

/// Admission middleware for the HTTP pipeline.
///
/// Plain requests hold an `http`-kind table entry for their duration. The
/// long-lived endpoints manage their own entries: SSE routes get a
/// check-only pass here and acquire an `sse` entry inside the handler, and
/// the WebSocket path is skipped entirely so a cap violation can surface as
/// a 1013 close after the upgrade instead of an HTTP error.
#[derive(Clone)]
pub struct AdmissionLayer {
    tracker: ConnectionTracker,
    client_ip_config: config::ClientIpConfig,
}

impl AdmissionLayer {
    pub fn new(tracker: ConnectionTracker, client_ip_config: config::ClientIpConfig) -> Self {
        Self {
            tracker,
            client_ip_config,
        }
    }
}

impl<Service> tower::Layer<Service> for AdmissionLayer
where
    Service: Send + Clone,
{
    type Service = AdmissionService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        AdmissionService {
            next,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AdmissionService<Service> {
    next: Service,
    layer: AdmissionLayer,
}

fn manages_own_connection(path: &str) -> bool {
    path.starts_with("/api/v1/chat/") && (path.ends_with("/stream") || path.ends_with("/blocks"))
}

impl<Service, ReqBody> tower::Service<http::Request<ReqBody>> for AdmissionService<Service>
where
    Service: tower::Service<http::Request<ReqBody>, Response = http::Response<axum::body::Body>>
        + Send
        + Clone
        + 'static,
    Service::Future: Send,
    Service::Error: std::fmt::Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = http::Response<axum::body::Body>;
    type Error = Service::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<http::Response<axum::body::Body>, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        use axum::response::IntoResponse;

        use crate::error::{ApiError, ErrorCode};

        let mut next = self.next.clone();
        let path = req.uri().path();

        if path == "/ws" {
            return Box::pin(next.call(req));
        }

        let ip = crate::client_ip::extract_client_ip(&self.layer.client_ip_config, &req);
        let tracker = self.layer.tracker.clone();

        if manages_own_connection(path) {
            let admissible = tracker.would_admit(ip);

            return Box::pin(async move {
                if !admissible {
                    let error = ApiError::new(ErrorCode::ConnectionLimit, "Connection limit reached");
                    return Ok(error.into_response());
                }

                next.call(req).await
            });
        }

        let guard = tracker.try_acquire(ConnectionKind::Http, ip);

        Box::pin(async move {
            let _guard = match guard {
                Ok(guard) => guard,
                Err(err) => {
                    log::debug!("Rejected request from {ip}: {err}");
                    let error = ApiError::new(ErrorCode::ConnectionLimit, "Connection limit reached");
                    return Ok(error.into_response());
                }
            };

            next.call(req).await
        })
    }
}
