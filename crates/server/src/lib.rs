//! Switchboard gateway library.
//!
//! Provides a reusable serve function wiring the HTTP surface, the run
//! registry, and the WebSocket handler, for the binary and for the
//! integration tests alike.

#![deny(missing_docs)]

mod admission;
mod auth;
mod client_ip;
mod collab;
mod cors;
mod error;
mod health;
mod hooks;
mod logbuf;
mod logger;
mod rate_limit;
mod request_log;
mod routes;
mod state;
mod ws;

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use ::rate_limit::RateLimitManager;
use anyhow::anyhow;
use async_trait::async_trait;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::handler::HandlerWithoutStateExt;
use axum::routing::get;
use blocks::ProfileRegistry;
use config::Config;
use runs::{ModelConnector, RunRegistry};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;

pub use admission::{AdmissionError, ConnectionInfo, ConnectionKind, ConnectionStats, ConnectionTracker};
pub use collab::{CollabError, SessionStore, ToolBroker};
pub use error::{ApiError, ErrorCode};
pub use health::{HealthCheck, HealthRegistry};
pub use hooks::{GatewayEvent, GatewayEvents};
pub use logbuf::{LogBuffer, LogEntry};
pub use state::GatewayState;
pub use ws::protocol::SUBPROTOCOL;

use crate::admission::AdmissionLayer;
use crate::auth::{AuthLayer, RequireAuthLayer};
use crate::hooks::GatewayEvent as Event;
use crate::request_log::RequestLogLayer;
use crate::state::GatewayStateInner;

/// Configuration for serving the gateway.
pub struct ServeConfig {
    /// The socket address to bind to; port 0 binds an ephemeral port.
    pub listen_address: SocketAddr,
    /// The deserialized switchboard TOML configuration.
    pub config: Config,
    /// Cancellation token requesting graceful shutdown.
    pub shutdown_signal: CancellationToken,
    /// Log filter string (e.g. `info` or `server=debug,runs=debug`).
    pub log_filter: String,
    /// The version string logged on startup and exposed in stats.
    pub version: String,
    /// Optional oneshot sender receiving the bound address (useful with
    /// port 0).
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
    /// The model collaborator that runs chats.
    pub model: Arc<dyn ModelConnector>,
    /// The optional session store collaborator.
    pub sessions: Option<Arc<dyn SessionStore>>,
    /// The optional tool runtime collaborator.
    pub tools: Option<Arc<dyn ToolBroker>>,
}

/// Starts and runs the gateway with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        log_filter,
        version,
        bound_addr_sender,
        model,
        sessions,
        tools,
    }: ServeConfig,
) -> anyhow::Result<()> {
    let log_buffer = LogBuffer::new(1000);
    logger::init(&log_filter, Some(log_buffer.clone()));

    log::info!("Switchboard {version}");

    config.validate()?;

    let mut profiles = ProfileRegistry::with_defaults();
    profiles
        .apply_config(&config.profiles)
        .map_err(|err| anyhow!("Invalid channel profile configuration: {err}"))?;

    let hooks = GatewayEvents::new();
    let connections = ConnectionTracker::new(&config.server.limits, hooks.clone());
    let registry = RunRegistry::new(&config.registry);

    let mut health = HealthRegistry::new();
    health.register(Arc::new(RegistryHealth {
        registry: registry.clone(),
    }));
    health.register(Arc::new(ConnectionsHealth {
        connections: connections.clone(),
        max_connections: config.server.limits.max_connections,
    }));

    let state = GatewayState::new(GatewayStateInner {
        version,
        registry,
        profiles: RwLock::new(profiles),
        connections: connections.clone(),
        model,
        sessions,
        tools,
        health,
        hooks: hooks.clone(),
        log_buffer,
        started_at: Instant::now(),
        shutdown: CancellationToken::new(),
        config: config.clone(),
    });

    tokio::spawn(idle_sweeper(
        connections.clone(),
        config.server.timeouts.idle_connection,
        config.server.timeouts.idle_sweep_interval,
        shutdown_signal.clone(),
    ));

    let rate_limit_manager = if config.server.rate_limits.enabled {
        log::debug!("Initializing rate limit manager with configured limits");
        Some(Arc::new(RateLimitManager::new(config.server.rate_limits.clone())))
    } else {
        log::debug!("Rate limiting disabled - no manager created");
        None
    };

    let cors = if config.server.cors.enabled {
        cors::new_layer(&config.server.cors)
    } else {
        // No allowances configured means no CORS headers are emitted.
        CorsLayer::new()
    };

    let api = routes::api_router().layer(RequireAuthLayer::new(&config.server.auth));

    let mut app = Router::new()
        .route("/", get(routes::landing::index))
        .nest("/api/v1", api)
        .route("/ws", get(ws::upgrade))
        .with_state(state.clone());

    if config.server.static_files.enabled {
        let static_config = &config.server.static_files;

        if static_config.index != "index.html" {
            log::warn!(
                "static.index '{}' is not supported; directories serve index.html",
                static_config.index
            );
        }

        let mut serve_dir = ServeDir::new(&static_config.root);
        if static_config.compression {
            serve_dir = serve_dir.precompressed_gzip();
        }

        let cache_control = http::HeaderValue::from_str(&format!("max-age={}", static_config.max_age.as_secs()))
            .unwrap_or_else(|_| http::HeaderValue::from_static("max-age=3600"));

        let static_service = tower::ServiceBuilder::new()
            .layer(SetResponseHeaderLayer::if_not_present(
                http::header::CACHE_CONTROL,
                cache_control,
            ))
            .service(serve_dir.not_found_service(not_found.into_service()));

        log::info!("Serving static files from {}", static_config.root.display());
        app = app.fallback_service(static_service);
    } else {
        app = app.fallback(not_found);
    }

    let app = app.layer(DefaultBodyLimit::max(config.server.limits.max_body_size)).layer(
        tower::ServiceBuilder::new()
            .layer(cors)
            .layer(AuthLayer::new(config.server.auth.clone()))
            .layer(RequestLogLayer::new(config.server.logging.clone(), hooks.clone()))
            .layer(rate_limit::RateLimitLayer::new(
                config.server.client_ip.clone(),
                rate_limit_manager,
            ))
            .layer(AdmissionLayer::new(connections.clone(), config.server.client_ip.clone()))
            .layer(TimeoutLayer::new(config.server.timeouts.request)),
    );

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    let bound_addr = listener.local_addr()?;

    if let Some(sender) = bound_addr_sender
        && sender.send(bound_addr).is_err()
    {
        log::warn!("Bound address receiver dropped before startup completed");
    }

    log::info!("API endpoint: http://{bound_addr}/api/v1");
    log::info!("WebSocket endpoint: ws://{bound_addr}/ws");

    hooks.emit(Event::Start);

    let graceful_signal = shutdown_signal.clone();
    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move { graceful_signal.cancelled().await });

    let watchdog = async {
        shutdown_signal.cancelled().await;

        log::info!("Received shutdown signal, shutting down gracefully...");
        hooks.emit(Event::Shutdown);

        // WebSocket loops close with 1001 and SSE emitters stop producing.
        state.shutdown.cancel();

        tokio::time::sleep(config.server.timeouts.shutdown).await;
    };

    tokio::select! {
        result = server => {
            result.map_err(|e| anyhow!("Server error: {e}"))?;
        }
        () = watchdog => {
            log::warn!("Graceful shutdown timed out, terminating remaining connections");
        }
    }

    hooks.emit(Event::Stop);

    Ok(())
}

/// The normalized 404 for unmatched routes.
async fn not_found() -> ApiError {
    ApiError::not_found("route not found")
}

async fn idle_sweeper(
    connections: ConnectionTracker,
    budget: Duration,
    cadence: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(cadence.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                connections.sweep_idle(budget);
            }
        }
    }
}

struct RegistryHealth {
    registry: RunRegistry,
}

#[async_trait]
impl HealthCheck for RegistryHealth {
    fn name(&self) -> &str {
        "registry"
    }

    async fn check(&self) -> Result<Option<serde_json::Value>, String> {
        Ok(Some(json!({ "runs": self.registry.run_count() })))
    }
}

struct ConnectionsHealth {
    connections: ConnectionTracker,
    max_connections: usize,
}

#[async_trait]
impl HealthCheck for ConnectionsHealth {
    fn name(&self) -> &str {
        "connections"
    }

    async fn check(&self) -> Result<Option<serde_json::Value>, String> {
        let stats = self.connections.stats();

        if stats.total >= self.max_connections {
            return Err(format!("at capacity ({} connections)", stats.total));
        }

        Ok(Some(serde_json::to_value(stats).map_err(|e| e.to_string())?))
    }
}
