//! The JSON wire protocol spoken over WebSocket text frames.
//!
//! Every frame is one of four kinds: client `request`s carrying a
//! correlation id, server `response`s echoing it, server `event`s for
//! subscribed streams, and server `error`s with an optional correlation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;

/// The subprotocol token identifying this wire version.
pub const SUBPROTOCOL: &str = "switchboard.v1";

/// Frames a client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// An action invocation on a channel.
    Request {
        /// Correlation id, echoed verbatim in the response.
        id: Value,
        /// Target channel, e.g. `run`.
        channel: String,
        /// Action on the channel, e.g. `subscribe`.
        action: String,
        /// Action-specific payload.
        #[serde(default)]
        payload: Value,
    },
}

/// Frames the server sends.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Reply to a request.
    Response {
        /// The request's correlation id.
        id: Value,
        /// Whether the action succeeded.
        success: bool,
        /// Action-specific payload.
        payload: Value,
    },
    /// A pushed event on a subscribed channel.
    Event {
        /// Source channel.
        channel: String,
        /// Event name.
        event: String,
        /// Event payload.
        payload: Value,
        /// Ordered-stream id (the BufferedEvent id for run events).
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },
    /// An error, correlated when it answers a request.
    Error {
        /// The failing request's correlation id, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        /// The error body.
        error: WireError,
    },
}

/// The error body carried by error frames.
#[derive(Debug, Serialize)]
pub struct WireError {
    /// Machine-readable code.
    pub code: &'static str,
    /// Human-readable, client-safe message.
    pub message: String,
    /// Optional structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ServerMessage {
    /// A successful response.
    pub fn response(id: Value, payload: Value) -> Self {
        Self::Response {
            id,
            success: true,
            payload,
        }
    }

    /// A run event frame carrying its BufferedEvent id.
    pub fn run_event(event: String, payload: Value, id: u64) -> Self {
        Self::Event {
            channel: "run".to_string(),
            event,
            payload,
            id: Some(id),
        }
    }

    /// An error frame.
    pub fn error(id: Option<Value>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            id,
            error: WireError {
                code: code.as_str(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Serializes to a text frame body. Serialization of these types cannot
    /// fail in practice; the fallback keeps the connection alive anyway.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            log::error!("Failed to serialize WebSocket frame: {err}");
            r#"{"type":"error","error":{"code":"INTERNAL_ERROR","message":"serialization failed"}}"#.to_string()
        })
    }
}
