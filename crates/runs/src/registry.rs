use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use config::RegistryConfig;
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::connector::RunHandle;
use crate::event::BufferedEvent;
use crate::queue::{QueueSender, QueueStream, queue};

/// Errors raised when subscribing to a run.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubscribeError {
    /// The run is unknown or already evicted.
    #[error("run '{0}' not found")]
    RunNotFound(String),
}

/// A point-in-time report about a registered run.
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    /// The run id.
    pub run_id: String,
    /// The owning session id.
    pub session_id: String,
    /// Whether the run's stream has terminated.
    pub done: bool,
    /// The id the next consumed event would receive.
    pub next_event_id: u64,
    /// The inclusive id range still held in the replay buffer.
    pub buffered_range: Option<(u64, u64)>,
    /// Live subscriber count.
    pub subscribers: usize,
}

struct RunEntry {
    run_id: String,
    session_id: String,
    cancellation: tokio_util::sync::CancellationToken,
    state: Mutex<RunState>,
}

struct RunState {
    next_event_id: u64,
    buffer: VecDeque<BufferedEvent>,
    subscribers: HashMap<u64, QueueSender<BufferedEvent>>,
    next_subscriber_id: u64,
    done: bool,
}

impl RunEntry {
    fn info(&self) -> RunInfo {
        let state = self.state.lock().expect("run state lock poisoned");

        let buffered_range = match (state.buffer.front(), state.buffer.back()) {
            (Some(first), Some(last)) => Some((first.id, last.id)),
            _ => None,
        };

        RunInfo {
            run_id: self.run_id.clone(),
            session_id: self.session_id.clone(),
            done: state.done,
            next_event_id: state.next_event_id,
            buffered_range,
            subscribers: state.subscribers.len(),
        }
    }
}

struct RegistryInner {
    runs: DashMap<String, Arc<RunEntry>>,
    buffer_size: usize,
    retention: Duration,
}

/// Owns the single consumer of every registered run and multiplexes its
/// events to subscribers, with a bounded replay buffer per run and a
/// retention window after completion.
#[derive(Clone)]
pub struct RunRegistry {
    inner: Arc<RegistryInner>,
}

impl RunRegistry {
    /// Creates a registry with the configured buffer size and retention.
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                runs: DashMap::new(),
                buffer_size: config.buffer_size.max(1),
                retention: config.retention,
            }),
        }
    }

    /// Registers a run and starts its consumer task. Registering an already
    /// known run id is a no-op (the new handle is dropped unconsumed);
    /// returns whether the run was actually registered.
    pub fn register(&self, handle: RunHandle) -> bool {
        let entry = Arc::new(RunEntry {
            run_id: handle.run_id.clone(),
            session_id: handle.session_id.clone(),
            cancellation: handle.cancellation.clone(),
            state: Mutex::new(RunState {
                next_event_id: 1,
                buffer: VecDeque::new(),
                subscribers: HashMap::new(),
                next_subscriber_id: 0,
                done: false,
            }),
        });

        match self.inner.runs.entry(handle.run_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                log::debug!("Run '{}' already registered, ignoring duplicate", handle.run_id);
                return false;
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(entry.clone());
            }
        }

        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(consume_run(inner, entry, handle));

        true
    }

    /// Subscribes to a run: replays every buffered event with `id >
    /// after_id`, then joins the live fan-out. If the run is already done
    /// the stream ends after the replay drains.
    ///
    /// When `after_id` predates the earliest buffered id, delivery starts at
    /// the oldest buffered event; the id jump is the caller's gap signal.
    pub fn subscribe_with_ids(&self, run_id: &str, after_id: Option<u64>) -> Result<Subscription, SubscribeError> {
        let entry = self
            .inner
            .runs
            .get(run_id)
            .ok_or_else(|| SubscribeError::RunNotFound(run_id.to_string()))?;

        let (sender, stream) = queue();
        let after_id = after_id.unwrap_or(0);

        let mut state = entry.state.lock().expect("run state lock poisoned");

        for event in state.buffer.iter().filter(|event| event.id > after_id) {
            sender.push(event.clone());
        }

        let guard = if state.done {
            // Dropping the sender closes the stream once the replay drains.
            None
        } else {
            let subscriber_id = state.next_subscriber_id;
            state.next_subscriber_id += 1;
            state.subscribers.insert(subscriber_id, sender);

            Some(SubscriberGuard {
                entry: Arc::downgrade(&entry),
                subscriber_id,
            })
        };

        drop(state);

        Ok(Subscription { stream, guard })
    }

    /// Forwards cancellation to the run's handle. Returns whether the run
    /// existed.
    pub fn cancel(&self, run_id: &str) -> bool {
        match self.inner.runs.get(run_id) {
            Some(entry) => {
                entry.cancellation.cancel();
                true
            }
            None => false,
        }
    }

    /// Reports a run's progress, or `None` when unknown or evicted.
    pub fn get_info(&self, run_id: &str) -> Option<RunInfo> {
        self.inner.runs.get(run_id).map(|entry| entry.info())
    }

    /// Reports every registered run.
    pub fn list_runs(&self) -> Vec<RunInfo> {
        self.inner.runs.iter().map(|entry| entry.info()).collect()
    }

    /// Number of registered runs, retention included.
    pub fn run_count(&self) -> usize {
        self.inner.runs.len()
    }

    /// Cancels and removes a run immediately, skipping retention. Returns
    /// whether the run existed.
    pub fn evict(&self, run_id: &str) -> bool {
        let Some((_, entry)) = self.inner.runs.remove(run_id) else {
            return false;
        };

        entry.cancellation.cancel();

        let mut state = entry.state.lock().expect("run state lock poisoned");
        state.done = true;
        state.subscribers.clear();

        true
    }
}

/// The consumer task: reads the handle's stream to its end, assigning ids
/// and fanning out, then closes subscribers and arms retention.
async fn consume_run(inner: Weak<RegistryInner>, entry: Arc<RunEntry>, mut handle: RunHandle) {
    let buffer_size = match inner.upgrade() {
        Some(registry) => registry.buffer_size,
        None => return,
    };

    while let Some(event) = handle.events.next().await {
        let mut state = entry.state.lock().expect("run state lock poisoned");

        let id = state.next_event_id;
        state.next_event_id += 1;

        let buffered = BufferedEvent { id, event };

        state.buffer.push_back(buffered.clone());
        while state.buffer.len() > buffer_size {
            state.buffer.pop_front();
        }

        // One pass over every live queue; pushes never block, so a slow
        // subscriber cannot starve the others.
        state.subscribers.retain(|_, sender| {
            sender.push(buffered.clone());
            !sender.is_closed()
        });
    }

    {
        let mut state = entry.state.lock().expect("run state lock poisoned");
        state.done = true;
        state.subscribers.clear();
    }

    log::debug!("Run '{}' done, retaining buffer for late subscribers", entry.run_id);

    let Some(registry) = inner.upgrade() else {
        return;
    };

    let retention = registry.retention;
    drop(registry);

    let run_id = entry.run_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(retention).await;

        if let Some(registry) = inner.upgrade() {
            registry.runs.remove(&run_id);
            log::debug!("Run '{run_id}' evicted after retention");
        }
    });
}

/// Removes the subscriber queue from the run on drop.
struct SubscriberGuard {
    entry: Weak<RunEntry>,
    subscriber_id: u64,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let Some(entry) = self.entry.upgrade() else {
            return;
        };

        if let Ok(mut state) = entry.state.lock() {
            state.subscribers.remove(&self.subscriber_id);
        }
    }
}

/// A live subscription: a stream of [`BufferedEvent`]s in id order.
///
/// Dropping the subscription unsubscribes; [`Subscription::unsubscribe`]
/// does so explicitly and is idempotent.
pub struct Subscription {
    stream: QueueStream<BufferedEvent>,
    guard: Option<SubscriberGuard>,
}

impl Subscription {
    /// Detaches from the live fan-out. Already buffered events still drain.
    pub fn unsubscribe(&mut self) {
        self.guard.take();
    }
}

impl Stream for Subscription {
    type Item = BufferedEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<BufferedEvent>> {
        Pin::new(&mut self.get_mut().stream).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::event::AgentEvent;

    fn test_registry(buffer_size: usize, retention: Duration) -> RunRegistry {
        RunRegistry::new(&RegistryConfig { buffer_size, retention })
    }

    fn scripted_handle(run_id: &str, count: usize) -> RunHandle {
        let events: Vec<AgentEvent> = (0..count).map(|i| AgentEvent::model_delta(format!("chunk {i}"))).collect();

        RunHandle {
            run_id: run_id.to_string(),
            session_id: "session".to_string(),
            events: stream::iter(events).boxed(),
            cancellation: CancellationToken::new(),
        }
    }

    /// A handle whose stream stays open until the returned sender is
    /// dropped.
    fn open_handle(run_id: &str) -> (RunHandle, tokio::sync::mpsc::UnboundedSender<AgentEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let handle = RunHandle {
            run_id: run_id.to_string(),
            session_id: "session".to_string(),
            events: tokio_stream::wrappers::UnboundedReceiverStream::new(rx).boxed(),
            cancellation: CancellationToken::new(),
        };

        (handle, tx)
    }

    #[tokio::test]
    async fn assigns_monotonic_ids_from_one() {
        let registry = test_registry(200, Duration::from_secs(600));

        registry.register(scripted_handle("run-1", 5));

        let subscription = registry.subscribe_with_ids("run-1", None).unwrap();
        let events: Vec<BufferedEvent> = subscription.collect().await;

        let ids: Vec<u64> = events.iter().map(|event| event.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn replays_after_the_requested_id() {
        let registry = test_registry(200, Duration::from_secs(600));

        registry.register(scripted_handle("run-1", 10));

        // Let the consumer drain the scripted stream.
        tokio::task::yield_now().await;

        let subscription = registry.subscribe_with_ids("run-1", Some(5)).unwrap();
        let ids: Vec<u64> = subscription.map(|event| event.id).collect().await;

        assert_eq!(ids, vec![6, 7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn replay_gap_is_observable_when_buffer_evicted() {
        let registry = test_registry(5, Duration::from_secs(600));

        registry.register(scripted_handle("run-1", 10));
        tokio::task::yield_now().await;

        // Only events 6..=10 are still buffered; asking for everything
        // after 0 starts at 6, which exposes the gap.
        let subscription = registry.subscribe_with_ids("run-1", Some(0)).unwrap();
        let ids: Vec<u64> = subscription.map(|event| event.id).collect().await;

        assert_eq!(ids, vec![6, 7, 8, 9, 10]);
        assert!(ids[0] > 1);
    }

    #[tokio::test]
    async fn live_subscribers_get_future_events_in_order() {
        let registry = test_registry(200, Duration::from_secs(600));
        let (handle, tx) = open_handle("run-1");

        registry.register(handle);

        let mut subscription = registry.subscribe_with_ids("run-1", None).unwrap();

        tx.send(AgentEvent::model_delta("a")).unwrap();
        tx.send(AgentEvent::model_delta("b")).unwrap();

        assert_eq!(subscription.next().await.unwrap().id, 1);
        assert_eq!(subscription.next().await.unwrap().id, 2);

        tx.send(AgentEvent::run_completed()).unwrap();
        drop(tx);

        assert_eq!(subscription.next().await.unwrap().id, 3);
        assert_eq!(subscription.next().await, None);
    }

    #[tokio::test]
    async fn two_subscribers_observe_the_same_order() {
        let registry = test_registry(200, Duration::from_secs(600));
        let (handle, tx) = open_handle("run-1");

        registry.register(handle);

        let first = registry.subscribe_with_ids("run-1", None).unwrap();
        let second = registry.subscribe_with_ids("run-1", None).unwrap();

        for i in 0..20 {
            tx.send(AgentEvent::model_delta(format!("{i}"))).unwrap();
        }
        drop(tx);

        let first_ids: Vec<u64> = first.map(|event| event.id).collect().await;
        let second_ids: Vec<u64> = second.map(|event| event.id).collect().await;

        assert_eq!(first_ids, second_ids);
        assert_eq!(first_ids.len(), 20);
    }

    #[tokio::test]
    async fn registering_the_same_run_twice_is_a_no_op() {
        let registry = test_registry(200, Duration::from_secs(600));

        assert!(registry.register(scripted_handle("run-1", 3)));
        assert!(!registry.register(scripted_handle("run-1", 99)));

        tokio::task::yield_now().await;

        let info = registry.get_info("run-1").unwrap();
        assert_eq!(info.next_event_id, 4);
    }

    #[tokio::test]
    async fn late_subscriber_after_completion_sees_tail_then_end() {
        let registry = test_registry(200, Duration::from_secs(600));

        registry.register(scripted_handle("run-1", 4));
        tokio::task::yield_now().await;

        let info = registry.get_info("run-1").unwrap();
        assert!(info.done);
        assert_eq!(info.buffered_range, Some((1, 4)));

        let subscription = registry.subscribe_with_ids("run-1", None).unwrap();
        let ids: Vec<u64> = subscription.map(|event| event.id).collect().await;

        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn cancel_reports_existence_and_terminates_subscribers() {
        let registry = test_registry(200, Duration::from_secs(600));
        let (mut handle, tx) = open_handle("run-1");

        // Wire the handle so cancellation ends the stream, like a
        // cooperating connector.
        let token = handle.cancellation.clone();
        let events = std::mem::replace(&mut handle.events, stream::empty().boxed());
        handle.events = events
            .take_until(async move { token.cancelled().await })
            .boxed();

        registry.register(handle);

        let mut subscription = registry.subscribe_with_ids("run-1", None).unwrap();

        tx.send(AgentEvent::model_delta("a")).unwrap();
        assert_eq!(subscription.next().await.unwrap().id, 1);

        assert!(registry.cancel("run-1"));
        assert!(!registry.cancel("missing"));

        assert_eq!(subscription.next().await, None);

        tokio::task::yield_now().await;
        assert!(registry.get_info("run-1").unwrap().done);
    }

    #[tokio::test(start_paused = true)]
    async fn retention_evicts_the_run() {
        let registry = test_registry(200, Duration::from_secs(600));

        registry.register(scripted_handle("run-1", 2));
        tokio::task::yield_now().await;

        assert!(registry.get_info("run-1").is_some());

        tokio::time::sleep(Duration::from_secs(601)).await;
        tokio::task::yield_now().await;

        assert!(registry.get_info("run-1").is_none());
        assert_eq!(registry.run_count(), 0);
    }

    #[tokio::test]
    async fn evict_removes_immediately() {
        let registry = test_registry(200, Duration::from_secs(600));
        let (handle, _tx) = open_handle("run-1");

        registry.register(handle);

        assert!(registry.evict("run-1"));
        assert!(!registry.evict("run-1"));
        assert!(registry.get_info("run-1").is_none());
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let registry = test_registry(200, Duration::from_secs(600));
        let (handle, tx) = open_handle("run-1");

        registry.register(handle);

        let mut subscription = registry.subscribe_with_ids("run-1", None).unwrap();
        subscription.unsubscribe();
        subscription.unsubscribe();

        tx.send(AgentEvent::model_delta("after")).unwrap();
        tokio::task::yield_now().await;

        assert_eq!(registry.get_info("run-1").unwrap().subscribers, 0);
    }

    #[tokio::test]
    async fn buffered_range_is_contiguous_and_bounded() {
        let registry = test_registry(3, Duration::from_secs(600));

        registry.register(scripted_handle("run-1", 7));
        tokio::task::yield_now().await;

        let info = registry.get_info("run-1").unwrap();
        let (first, last) = info.buffered_range.unwrap();

        assert_eq!((first, last), (5, 7));
        assert!(last - first + 1 <= 3);
    }
}
