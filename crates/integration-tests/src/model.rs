//! The scripted model connector the test gateway runs against.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use runs::{AgentEvent, ConnectorError, ModelConnector, RunHandle, RunRequest};
use tokio_util::sync::CancellationToken;

const DELTA_DELAY: Duration = Duration::from_millis(5);

/// Streams deterministic events derived from the request message.
///
/// Message conventions steer the script:
/// - `#fail` refuses to start the run.
/// - `#hold` streams two deltas and then stays open until cancelled.
/// - `#count:<n>` streams `n` numbered deltas.
/// - anything else echoes the message word by word.
pub struct ScriptedConnector {
    _private: (),
}

impl ScriptedConnector {
    /// Creates the connector.
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelConnector for ScriptedConnector {
    async fn start_run(&self, request: RunRequest) -> Result<RunHandle, ConnectorError> {
        if request.message == "#fail" {
            return Err(ConnectorError::StartFailed("scripted refusal".to_string()));
        }

        let cancellation = CancellationToken::new();

        if request.message == "#hold" {
            let events = futures::stream::iter([
                AgentEvent::model_delta("held "),
                AgentEvent::model_delta("open"),
            ])
            .chain(futures::stream::pending());

            let stop = cancellation.clone();
            let events = events
                .take_until(async move { stop.cancelled().await })
                .chain(futures::stream::once(async { AgentEvent::run_cancelled() }))
                .boxed();

            return Ok(RunHandle {
                run_id: request.run_id,
                session_id: request.session_id,
                events,
                cancellation,
            });
        }

        let deltas: Vec<String> = if let Some(count) = request.message.strip_prefix("#count:") {
            let count: usize = count.parse().unwrap_or(1);
            (0..count).map(|i| format!("delta {i} ")).collect()
        } else {
            request.message.split_inclusive(' ').map(str::to_string).collect()
        };

        let events = futures::stream::iter(deltas)
            .then(|text| async move {
                tokio::time::sleep(DELTA_DELAY).await;
                AgentEvent::model_delta(text)
            })
            .chain(futures::stream::iter([
                AgentEvent::model_complete(),
                AgentEvent::run_completed(),
            ]))
            .boxed();

        Ok(RunHandle {
            run_id: request.run_id,
            session_id: request.session_id,
            events,
            cancellation,
        })
    }
}
