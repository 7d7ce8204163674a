//! Run lifecycle plumbing: the event model, the single-consumer registry
//! with multiplexed fan-out and replay, and the model connector seam.
//!
//! One model invocation produces one ordered event stream. The
//! [`RunRegistry`] owns the only consumer of that stream, assigns stable
//! monotonic ids, keeps a bounded replay buffer, and fans events out to any
//! number of live subscribers without letting one starve another.

#![deny(missing_docs)]

mod connector;
mod event;
mod queue;
mod registry;

pub use connector::{ConnectorError, ModelConnector, RunHandle, RunRequest};
pub use event::{AgentEvent, BufferedEvent, tag};
pub use queue::{PushOutcome, QueueSender, QueueStream, bounded_queue, queue};
pub use registry::{RunInfo, RunRegistry, SubscribeError, Subscription};
