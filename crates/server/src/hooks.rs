//! Gateway lifecycle events for embedders and diagnostics.

use std::net::IpAddr;

use tokio::sync::broadcast;

use crate::admission::ConnectionKind;

/// Events emitted over the gateway's lifetime.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// The server bound its listener.
    Start,
    /// The server finished shutting down.
    Stop,
    /// A connection was admitted.
    Connection {
        /// Connection id.
        id: u64,
        /// Transport kind.
        kind: ConnectionKind,
        /// Remote address.
        ip: IpAddr,
    },
    /// A connection left the table.
    Disconnection {
        /// Connection id.
        id: u64,
    },
    /// A request finished.
    Request {
        /// HTTP method.
        method: String,
        /// Request path.
        path: String,
        /// Response status.
        status: u16,
    },
    /// A handler or background task reported a failure.
    Error {
        /// Client-safe description.
        message: String,
    },
    /// Shutdown was requested; connections are about to close.
    Shutdown,
}

/// Broadcast fan-out of [`GatewayEvent`]s. Emission never blocks; slow or
/// absent listeners miss events rather than stalling the gateway.
#[derive(Debug, Clone)]
pub struct GatewayEvents {
    tx: broadcast::Sender<GatewayEvent>,
}

impl GatewayEvents {
    /// Creates an event hub with a bounded listener backlog.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Emits an event to all current listeners.
    pub fn emit(&self, event: GatewayEvent) {
        // Send only fails when nobody listens, which is the common case.
        let _ = self.tx.send(event);
    }

    /// Subscribes to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }
}

impl Default for GatewayEvents {
    fn default() -> Self {
        Self::new()
    }
}
