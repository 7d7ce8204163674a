//! The SSE surfaces: raw run events with resume, and profile-shaped blocks.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::StreamExt;
use http::HeaderMap;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use blocks::{BlockStreamer, DeliveryMode, StreamerOptions, StreamerOutput};
use runs::{BufferedEvent, Subscription, tag};

use crate::admission::{ConnectionGuard, ConnectionKind};
use crate::client_ip::client_ip;
use crate::error::{ApiError, ErrorCode};
use crate::state::GatewayState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("ping")
}

fn acquire_sse(
    state: &GatewayState,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> Result<ConnectionGuard, ApiError> {
    let ip = client_ip(&state.config.server.client_ip, headers, Some(peer));

    state
        .connections
        .try_acquire(ConnectionKind::Sse, ip)
        .map_err(|err| {
            log::debug!("SSE connection from {ip} rejected: {err}");
            ApiError::new(ErrorCode::ConnectionLimit, "Connection limit reached")
        })
}

fn subscribe(state: &GatewayState, run_id: &str, after_id: Option<u64>) -> Result<Subscription, ApiError> {
    state
        .registry
        .subscribe_with_ids(run_id, after_id)
        .map_err(|_| ApiError::not_found(format!("run '{run_id}' not found")))
}

/// `GET /api/v1/chat/{run_id}/stream`: raw BufferedEvents over SSE.
///
/// The `Last-Event-ID` request header resumes after the given id. Events
/// evicted from the replay buffer are not resent; clients detect the gap
/// from the first delivered id.
pub async fn events(
    State(state): State<GatewayState>,
    Path(run_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let after_id = headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    let subscription = subscribe(&state, &run_id, after_id)?;
    let guard = acquire_sse(&state, &headers, peer)?;
    let gone = guard.token();

    let stream = subscription
        .take_until(gone.cancelled_owned())
        .map(move |event| {
            guard.touch();
            Ok::<_, Infallible>(raw_event(event))
        });

    log::debug!("SSE event stream attached to run {run_id} (after_id {after_id:?})");

    // Disable proxy buffering so events reach the client as they happen.
    Ok((
        [("x-accel-buffering", "no")],
        Sse::new(stream).keep_alive(keep_alive()),
    ))
}

fn raw_event(buffered: BufferedEvent) -> Event {
    let data = serde_json::to_string(&buffered.event.payload).unwrap_or_else(|err| {
        log::error!("Failed to serialize event payload: {err}");
        r#"{"error":"serialization failed"}"#.to_string()
    });

    Event::default()
        .event(buffered.event.tag)
        .id(buffered.id.to_string())
        .data(data)
}

#[derive(Debug, Deserialize)]
pub struct BlocksQuery {
    profile: Option<String>,
    mode: Option<String>,
}

/// `GET /api/v1/chat/{run_id}/blocks?profile=<name>`: the run's text
/// shaped into destination-sized blocks by the named profile.
pub async fn blocks(
    State(state): State<GatewayState>,
    Path(run_id): Path<String>,
    Query(query): Query<BlocksQuery>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let profile_name = query.profile.as_deref().unwrap_or("web");

    let profile = state
        .profiles
        .read()
        .ok()
        .and_then(|profiles| profiles.get(profile_name).cloned())
        .ok_or_else(|| {
            ApiError::validation(format!("unknown channel profile '{profile_name}'"))
        })?;

    let mode = match query.mode.as_deref() {
        None => None,
        Some("block") => Some(DeliveryMode::Block),
        Some("streaming") => Some(DeliveryMode::Streaming),
        Some("batch") => Some(DeliveryMode::Batch),
        Some(other) => {
            return Err(ApiError::validation(format!("unknown delivery mode '{other}'")));
        }
    };

    let subscription = subscribe(&state, &run_id, None)?;
    let guard = acquire_sse(&state, &headers, peer)?;

    let streamer = BlockStreamer::with_options(
        profile,
        StreamerOptions {
            mode,
            ..StreamerOptions::new()
        },
    );

    let emitter = BlockEmitter {
        subscription,
        streamer,
        queue: VecDeque::new(),
        gone: guard.token(),
        guard,
        finished: false,
    };

    let stream = futures::stream::unfold(emitter, |mut emitter| async move {
        loop {
            if let Some(event) = emitter.queue.pop_front() {
                return Some((Ok::<_, Infallible>(event), emitter));
            }

            if emitter.finished {
                return None;
            }

            let next = tokio::select! {
                _ = emitter.gone.cancelled() => {
                    // Forced disconnect: discard pending output, no summary.
                    emitter.streamer.abort();
                    emitter.finished = true;
                    return None;
                }
                next = emitter.subscription.next() => next,
            };

            match next {
                Some(buffered) => emitter.feed(buffered),
                None => emitter.finish(),
            }
        }
    });

    log::debug!("SSE block stream attached to run {run_id} (profile {profile_name})");

    Ok((
        [("x-accel-buffering", "no")],
        Sse::new(stream).keep_alive(keep_alive()),
    ))
}

/// Pulls run events, drives the block streamer, and queues SSE frames.
struct BlockEmitter {
    subscription: Subscription,
    streamer: BlockStreamer,
    queue: VecDeque<Event>,
    gone: CancellationToken,
    guard: ConnectionGuard,
    finished: bool,
}

impl BlockEmitter {
    fn feed(&mut self, buffered: BufferedEvent) {
        self.guard.touch();

        if let Some(text) = buffered.event.delta_text() {
            if let Ok(outputs) = self.streamer.push(text) {
                self.queue_outputs(outputs);
            }

            return;
        }

        if buffered.event.tag == tag::RUN_ERROR {
            self.queue.push_back(json_event("error", &buffered.event.payload));
        }
    }

    fn finish(&mut self) {
        let completion = self.streamer.complete();
        self.queue_outputs(completion.outputs);

        if let Some(summary) = completion.summary {
            self.queue.push_back(json_event("summary", &summary));
        }

        self.finished = true;
    }

    fn queue_outputs(&mut self, outputs: Vec<StreamerOutput>) {
        for output in outputs {
            let event = match &output {
                StreamerOutput::Block(block) => json_event("block", block),
                StreamerOutput::Update(update) => json_event("update", update),
            };

            self.queue.push_back(event);
        }
    }
}

fn json_event<T: serde::Serialize>(name: &'static str, payload: &T) -> Event {
    let data = serde_json::to_string(payload).unwrap_or_else(|err| {
        log::error!("Failed to serialize {name} frame: {err}");
        r#"{"error":"serialization failed"}"#.to_string()
    });

    Event::default().event(name).data(data)
}
