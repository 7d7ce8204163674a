use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::event::AgentEvent;

/// A chat request handed to the model collaborator.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// The run id the gateway allocated for this invocation.
    pub run_id: String,
    /// The session the run belongs to.
    pub session_id: String,
    /// The user message.
    pub message: String,
    /// Optional scheduling priority hint, passed through untouched.
    pub priority: Option<String>,
    /// Optional context assembly options, passed through untouched.
    pub context_options: Option<Value>,
}

/// A live model invocation: the single-consumer event stream plus its
/// cancellation lever.
pub struct RunHandle {
    /// The run id, matching the request.
    pub run_id: String,
    /// The session the run belongs to.
    pub session_id: String,
    /// The ordered, finite event stream. Consumed exactly once, by the
    /// registry.
    pub events: BoxStream<'static, AgentEvent>,
    /// Cancelling this token asks the model to wind the run down; the
    /// stream then terminates on its own.
    pub cancellation: CancellationToken,
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("run_id", &self.run_id)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Errors a model connector can report when asked to start a run.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// The model refused to begin the run.
    #[error("model refused to start the run: {0}")]
    StartFailed(String),

    /// No model collaborator is configured.
    #[error("model connector is not configured")]
    Unavailable,
}

/// The model collaborator seam.
///
/// Provider adapters live outside this system; the gateway only relies on
/// getting back a [`RunHandle`] whose stream yields the run's events in
/// order and ends when the run is over.
#[async_trait]
pub trait ModelConnector: Send + Sync {
    /// Starts a model run for the given request.
    async fn start_run(&self, request: RunRequest) -> Result<RunHandle, ConnectorError>;
}
