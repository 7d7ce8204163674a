//! The multiplexed WebSocket surface.
//!
//! One connection carries any number of logical channels; requests are
//! correlated by id, run subscriptions stream ordered events, and a bounded
//! outgoing queue stands in for the socket's buffered amount: overflow
//! means a slow consumer and closes the connection with 1013.

pub mod protocol;

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Extension, State};
use axum::response::{IntoResponse, Response};
use context::{AuthMethod, AuthPrincipal};
use futures::{SinkExt, StreamExt};
use http::HeaderMap;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use runs::{RunRequest, Subscription};

use crate::admission::ConnectionKind;
use crate::client_ip::client_ip;
use crate::error::{ApiError, ErrorCode};
use crate::routes::chat::{map_connector_error, run_info_json};
use crate::state::GatewayState;
use crate::ws::protocol::{ClientMessage, SUBPROTOCOL, ServerMessage};

const CLOSE_GOING_AWAY: u16 = 1001;
const CLOSE_POLICY_VIOLATION: u16 = 1008;
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// `GET /ws`: upgrades to the multiplexed channel protocol. Handshakes
/// that do not offer the expected subprotocol are rejected.
pub async fn upgrade(
    State(state): State<GatewayState>,
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    principal: Option<Extension<AuthPrincipal>>,
) -> Response {
    let offered = headers
        .get("sec-websocket-protocol")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(',').any(|token| token.trim() == SUBPROTOCOL))
        .unwrap_or(false);

    if !offered {
        return ApiError::validation(format!("subprotocol '{SUBPROTOCOL}' must be offered")).into_response();
    }

    let ip = client_ip(&state.config.server.client_ip, &headers, Some(peer));
    let principal = principal.map(|ext| ext.0).unwrap_or_default();

    ws.protocols([SUBPROTOCOL])
        .on_upgrade(move |socket| session(state, socket, ip, principal))
}

async fn session(state: GatewayState, mut socket: WebSocket, ip: IpAddr, principal: AuthPrincipal) {
    // Admission happens after the upgrade so a violation surfaces as the
    // 1013 close the protocol prescribes.
    let guard = match state.connections.try_acquire(ConnectionKind::Websocket, ip) {
        Ok(guard) => guard,
        Err(err) => {
            log::debug!("WebSocket from {ip} rejected: {err}");

            let _ = socket
                .send(close_message(CLOSE_TRY_AGAIN_LATER, "connection limit reached"))
                .await;

            return;
        }
    };

    if principal.method != AuthMethod::Anonymous {
        state.connections.set_subject(guard.id(), &principal.subject);
    }

    let connection_id = guard.id();
    log::debug!("WebSocket connection {connection_id} established from {ip}");

    let (mut sink, mut stream) = socket.split();

    let queue_depth = state.config.server.limits.max_ws_queued_frames.max(1);
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(queue_depth);

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let last = matches!(message, Message::Close(_));

            if sink.send(message).await.is_err() || last {
                break;
            }
        }
    });

    let ws_timeout = state.config.server.timeouts.websocket;
    let heartbeat_interval = (ws_timeout / 2).max(MIN_HEARTBEAT_INTERVAL);

    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let gone = guard.token();

    let mut handler = WsSession {
        state: state.clone(),
        out: out_tx.clone(),
        fatal: CancellationToken::new(),
        subscriptions: HashMap::new(),
        channels: HashSet::new(),
    };

    let mut last_activity = Instant::now();

    let close: Option<(u16, &str)> = loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    last_activity = Instant::now();
                    guard.touch();
                    handler.handle_text(text.as_str()).await;
                }
                Some(Ok(Message::Pong(_) | Message::Ping(_))) => {
                    last_activity = Instant::now();
                    guard.touch();
                }
                Some(Ok(Message::Binary(_))) => {
                    handler.send_frame(ServerMessage::error(
                        None,
                        ErrorCode::ValidationError,
                        "binary frames are not supported",
                    ));
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break None,
            },
            _ = heartbeat.tick() => {
                if last_activity.elapsed() > ws_timeout {
                    break Some((CLOSE_POLICY_VIOLATION, "ping timeout"));
                }

                if out_tx.try_send(Message::Ping(Bytes::new())).is_err() {
                    break Some((CLOSE_TRY_AGAIN_LATER, "slow consumer"));
                }
            }
            _ = gone.cancelled() => break Some((CLOSE_GOING_AWAY, "disconnected by server")),
            _ = state.shutdown.cancelled() => break Some((CLOSE_GOING_AWAY, "server shutting down")),
            _ = handler.fatal.cancelled() => break Some((CLOSE_TRY_AGAIN_LATER, "slow consumer")),
        }
    };

    for (_, token) in handler.subscriptions.drain() {
        token.cancel();
    }

    if let Some((code, reason)) = close {
        // Best effort; a full queue means the client stopped reading.
        let _ = out_tx.try_send(close_message(code, reason));
    }

    drop(out_tx);
    drop(handler);
    let _ = writer.await;

    log::debug!("WebSocket connection {connection_id} closed");
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}

/// Per-connection protocol state and dispatch.
struct WsSession {
    state: GatewayState,
    out: mpsc::Sender<Message>,
    /// Cancelled when the outgoing queue overflows.
    fatal: CancellationToken,
    /// Live run subscriptions by run id.
    subscriptions: HashMap<String, CancellationToken>,
    /// Logical channel memberships, e.g. `session:<id>`.
    channels: HashSet<String>,
}

impl WsSession {
    fn send_frame(&self, frame: ServerMessage) {
        match self.out.try_send(Message::Text(frame.to_text().into())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.fatal.cancel(),
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn send_error(&self, id: Option<Value>, error: &ApiError) {
        self.send_frame(ServerMessage::error(id, error.code(), error.message()));
    }

    async fn handle_text(&mut self, text: &str) {
        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(err) => {
                log::debug!("Malformed WebSocket frame: {err}");
                self.send_frame(ServerMessage::error(
                    None,
                    ErrorCode::ValidationError,
                    "malformed message; expected a request frame",
                ));
                return;
            }
        };

        let ClientMessage::Request {
            id,
            channel,
            action,
            payload,
        } = message;

        self.dispatch(id, &channel, &action, payload).await;
    }

    async fn dispatch(&mut self, id: Value, channel: &str, action: &str, payload: Value) {
        match (channel, action) {
            ("system", "ping") => self.respond(
                id,
                json!({ "pong": true, "time": jiff::Timestamp::now().to_string() }),
            ),
            ("system", "stats") => {
                let payload = json!({
                    "uptime_secs": self.state.uptime_secs(),
                    "connections": self.state.connections.stats(),
                    "runs": self.state.registry.run_count(),
                });

                self.respond(id, payload);
            }
            ("system", _) => self.unknown_action(id, channel, action),

            ("session", "get") => self.session_get(id, &payload).await,
            ("session", "subscribe") => self.session_membership(id, &payload, true),
            ("session", "unsubscribe") => self.session_membership(id, &payload, false),
            ("session", _) => self.unknown_action(id, channel, action),

            ("chat", "send") => self.chat_send(id, payload).await,
            ("chat", "cancel") => self.chat_cancel(id, &payload),
            ("chat", _) => self.unknown_action(id, channel, action),

            ("run", "status") => self.run_status(id, &payload),
            ("run", "subscribe") => self.run_subscribe(id, &payload),
            ("run", "unsubscribe") => self.run_unsubscribe(id, &payload),
            ("run", _) => self.unknown_action(id, channel, action),

            _ => self.send_frame(ServerMessage::error(
                Some(id),
                ErrorCode::UnknownChannel,
                format!("unknown channel '{channel}'"),
            )),
        }
    }

    fn respond(&self, id: Value, payload: Value) {
        self.send_frame(ServerMessage::response(id, payload));
    }

    fn unknown_action(&self, id: Value, channel: &str, action: &str) {
        self.send_frame(ServerMessage::error(
            Some(id),
            ErrorCode::UnknownAction,
            format!("unknown action '{action}' on channel '{channel}'"),
        ));
    }

    fn required_str(&self, id: &Value, payload: &Value, key: &str) -> Option<String> {
        match payload.get(key).and_then(Value::as_str) {
            Some(value) if !value.is_empty() => Some(value.to_string()),
            _ => {
                self.send_frame(ServerMessage::error(
                    Some(id.clone()),
                    ErrorCode::ValidationError,
                    format!("payload field '{key}' is required"),
                ));
                None
            }
        }
    }

    async fn session_get(&self, id: Value, payload: &Value) {
        let Some(session_id) = self.required_str(&id, payload, "sessionId") else {
            return;
        };

        let Some(store) = self.state.sessions.clone() else {
            let error = ApiError::service_unavailable("Session store is not configured");
            self.send_error(Some(id), &error);
            return;
        };

        match store.get_session(&session_id).await {
            Ok(session) => self.respond(id, session),
            Err(err) => self.send_error(Some(id), &ApiError::from(err)),
        }
    }

    fn session_membership(&mut self, id: Value, payload: &Value, join: bool) {
        let Some(session_id) = self.required_str(&id, payload, "sessionId") else {
            return;
        };

        let channel = format!("session:{session_id}");

        if join {
            self.channels.insert(channel);
        } else {
            self.channels.remove(&channel);
        }

        self.respond(id, json!({ "sessionId": session_id, "subscribed": join }));
    }

    async fn chat_send(&mut self, id: Value, payload: Value) {
        let Some(message) = self.required_str(&id, &payload, "message") else {
            return;
        };

        let run_id = Uuid::new_v4().to_string();
        let session_id = payload
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let request = RunRequest {
            run_id: run_id.clone(),
            session_id: session_id.clone(),
            message,
            priority: payload.get("priority").and_then(Value::as_str).map(str::to_string),
            context_options: payload.get("contextOptions").cloned(),
        };

        match self.state.model.start_run(request).await {
            Ok(handle) => {
                self.state.registry.register(handle);

                log::info!("Run {run_id} started over WebSocket for session {session_id}");

                if self.channels.contains(&format!("session:{session_id}")) {
                    self.send_frame(ServerMessage::Event {
                        channel: "session".to_string(),
                        event: "run.started".to_string(),
                        payload: json!({ "runId": run_id, "sessionId": session_id }),
                        id: None,
                    });
                }

                self.respond(id, json!({ "runId": run_id, "sessionId": session_id }));
            }
            Err(err) => self.send_error(Some(id), &map_connector_error(err)),
        }
    }

    fn chat_cancel(&self, id: Value, payload: &Value) {
        let Some(run_id) = self.required_str(&id, payload, "runId") else {
            return;
        };

        if self.state.registry.cancel(&run_id) {
            self.respond(id, json!({ "runId": run_id, "status": "cancelling" }));
        } else {
            let error = ApiError::not_found(format!("run '{run_id}' not found"));
            self.send_error(Some(id), &error);
        }
    }

    fn run_status(&self, id: Value, payload: &Value) {
        let Some(run_id) = self.required_str(&id, payload, "runId") else {
            return;
        };

        match self.state.registry.get_info(&run_id) {
            Some(info) => self.respond(id, run_info_json(&info)),
            None => {
                let error = ApiError::not_found(format!("run '{run_id}' not found"));
                self.send_error(Some(id), &error);
            }
        }
    }

    fn run_subscribe(&mut self, id: Value, payload: &Value) {
        let Some(run_id) = self.required_str(&id, payload, "runId") else {
            return;
        };

        let cap = self.state.config.server.limits.max_ws_subscriptions_per_connection;

        if self.subscriptions.len() >= cap {
            self.send_frame(ServerMessage::error(
                Some(id),
                ErrorCode::SubscriptionLimit,
                format!("subscription limit ({cap}) reached"),
            ));
            return;
        }

        if self.subscriptions.contains_key(&run_id) {
            self.respond(id, json!({ "runId": run_id, "subscribed": true }));
            return;
        }

        let after_id = payload.get("afterId").and_then(Value::as_u64);

        let subscription = match self.state.registry.subscribe_with_ids(&run_id, after_id) {
            Ok(subscription) => subscription,
            Err(_) => {
                let error = ApiError::not_found(format!("run '{run_id}' not found"));
                self.send_error(Some(id), &error);
                return;
            }
        };

        // Respond before the forwarder starts so the acknowledgement
        // precedes the first event frame.
        self.respond(id, json!({ "runId": run_id, "subscribed": true }));
        self.spawn_forwarder(run_id.clone(), subscription);
    }

    fn run_unsubscribe(&mut self, id: Value, payload: &Value) {
        let Some(run_id) = self.required_str(&id, payload, "runId") else {
            return;
        };

        let existed = match self.subscriptions.remove(&run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        };

        self.respond(id, json!({ "runId": run_id, "subscribed": false, "existed": existed }));
    }

    /// Forwards one run subscription into the outgoing queue until the run
    /// ends, the subscription is cancelled, or the queue overflows.
    fn spawn_forwarder(&mut self, run_id: String, mut subscription: Subscription) {
        let token = CancellationToken::new();
        self.subscriptions.insert(run_id.clone(), token.clone());

        let out = self.out.clone();
        let fatal = self.fatal.clone();

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => break,
                    next = subscription.next() => next,
                };

                let Some(buffered) = next else {
                    let frame = ServerMessage::Event {
                        channel: "run".to_string(),
                        event: "end".to_string(),
                        payload: json!({ "runId": run_id }),
                        id: None,
                    };

                    let _ = out.try_send(Message::Text(frame.to_text().into()));
                    break;
                };

                let frame = ServerMessage::run_event(buffered.event.tag.clone(), buffered.event.payload, buffered.id);

                match out.try_send(Message::Text(frame.to_text().into())) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        log::debug!("WebSocket subscriber too slow on run {run_id}, closing");
                        fatal.cancel();
                        break;
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        });
    }
}
