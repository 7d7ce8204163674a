use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Well-known event tags emitted by model connectors.
///
/// The set is open: the core treats tags as opaque strings and preserves
/// order; these constants only name the ones the gateway itself inspects.
pub mod tag {
    /// Incremental assistant text.
    pub const MODEL_DELTA: &str = "model.delta";
    /// The model finished producing text.
    pub const MODEL_COMPLETE: &str = "model.complete";
    /// The run finished normally.
    pub const RUN_COMPLETED: &str = "run.completed";
    /// The run was cancelled.
    pub const RUN_CANCELLED: &str = "run.cancelled";
    /// The run failed.
    pub const RUN_ERROR: &str = "run.error";
    /// A tool invocation started.
    pub const TOOL_STARTED: &str = "tool.started";
    /// A tool invocation finished.
    pub const TOOL_COMPLETED: &str = "tool.completed";
}

/// One step of a model run. Opaque to the serving core except for ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Event kind, e.g. `model.delta`.
    pub tag: String,
    /// Tag-specific payload.
    pub payload: Value,
}

impl AgentEvent {
    /// Creates an event with an arbitrary tag and payload.
    pub fn new(tag: impl Into<String>, payload: Value) -> Self {
        Self {
            tag: tag.into(),
            payload,
        }
    }

    /// An incremental text delta.
    pub fn model_delta(text: impl Into<String>) -> Self {
        Self::new(tag::MODEL_DELTA, json!({ "text": text.into() }))
    }

    /// The model finished producing text.
    pub fn model_complete() -> Self {
        Self::new(tag::MODEL_COMPLETE, json!({}))
    }

    /// The run finished normally.
    pub fn run_completed() -> Self {
        Self::new(tag::RUN_COMPLETED, json!({}))
    }

    /// The run was cancelled.
    pub fn run_cancelled() -> Self {
        Self::new(tag::RUN_CANCELLED, json!({}))
    }

    /// The run failed with the given message.
    pub fn run_error(message: impl Into<String>) -> Self {
        Self::new(tag::RUN_ERROR, json!({ "message": message.into() }))
    }

    /// The delta text, when this is a `model.delta` event.
    pub fn delta_text(&self) -> Option<&str> {
        (self.tag == tag::MODEL_DELTA)
            .then(|| self.payload.get("text").and_then(Value::as_str))
            .flatten()
    }

    /// Whether this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self.tag.as_str(), tag::RUN_COMPLETED | tag::RUN_CANCELLED | tag::RUN_ERROR)
    }
}

/// An [`AgentEvent`] annotated with its stable, strictly increasing per-run
/// id. Ids start at 1 in consumption order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedEvent {
    /// The replay id.
    pub id: u64,
    /// The wrapped event.
    pub event: AgentEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_text_extraction() {
        let event = AgentEvent::model_delta("hello");

        assert_eq!(event.tag, tag::MODEL_DELTA);
        assert_eq!(event.delta_text(), Some("hello"));
        assert_eq!(AgentEvent::run_completed().delta_text(), None);
    }

    #[test]
    fn terminal_tags() {
        assert!(AgentEvent::run_completed().is_terminal());
        assert!(AgentEvent::run_cancelled().is_terminal());
        assert!(AgentEvent::run_error("boom").is_terminal());
        assert!(!AgentEvent::model_delta("x").is_terminal());
    }
}
