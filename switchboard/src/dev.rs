//! A built-in development connector so the gateway runs standalone.
//!
//! Real deployments wire a provider adapter in front of the model; this one
//! streams a canned acknowledgement of the user message, word by word, and
//! honours cancellation.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use runs::{AgentEvent, ConnectorError, ModelConnector, RunHandle, RunRequest};
use tokio_util::sync::CancellationToken;

const WORD_DELAY: Duration = Duration::from_millis(40);

pub struct DevConnector;

#[async_trait]
impl ModelConnector for DevConnector {
    async fn start_run(&self, request: RunRequest) -> Result<RunHandle, ConnectorError> {
        let cancellation = CancellationToken::new();

        let reply = format!(
            "You said: {}\n\nThis is the switchboard development model. \
            Configure a real model connector for actual answers.",
            request.message
        );

        let words: Vec<String> = reply.split_inclusive(' ').map(str::to_string).collect();

        let body = futures::stream::iter(words)
            .then(|word| async move {
                tokio::time::sleep(WORD_DELAY).await;
                AgentEvent::model_delta(word)
            })
            .chain(futures::stream::iter([
                AgentEvent::model_complete(),
                AgentEvent::run_completed(),
            ]));

        let stop = cancellation.clone();
        let trailer_token = cancellation.clone();

        // Ends the stream on cancellation and appends the cancelled event in
        // that case only.
        let trailer = futures::stream::once(async move { trailer_token.is_cancelled().then(AgentEvent::run_cancelled) })
            .filter_map(|event| async move { event });

        let events = body
            .take_until(async move { stop.cancelled().await })
            .chain(trailer)
            .boxed();

        Ok(RunHandle {
            run_id: request.run_id,
            session_id: request.session_id,
            events,
            cancellation,
        })
    }
}
