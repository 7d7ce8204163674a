use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};

/// What happened to a pushed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The item was queued.
    Delivered,
    /// The consumer is gone; the item was dropped.
    Closed,
    /// The bounded queue is full; the item was dropped. The consumer is too
    /// slow.
    Overflow,
}

/// The writer half of a fan-out queue. Pushing never blocks; dropping the
/// sender closes the stream after buffered items drain.
#[derive(Debug)]
pub struct QueueSender<T> {
    inner: SenderKind<T>,
}

#[derive(Debug)]
enum SenderKind<T> {
    Unbounded(mpsc::UnboundedSender<T>),
    Bounded(mpsc::Sender<T>),
}

impl<T> QueueSender<T> {
    /// Pushes an item without ever blocking the producer.
    pub fn push(&self, item: T) -> PushOutcome {
        match &self.inner {
            SenderKind::Unbounded(tx) => match tx.send(item) {
                Ok(()) => PushOutcome::Delivered,
                Err(_) => PushOutcome::Closed,
            },
            SenderKind::Bounded(tx) => match tx.try_send(item) {
                Ok(()) => PushOutcome::Delivered,
                Err(mpsc::error::TrySendError::Full(_)) => PushOutcome::Overflow,
                Err(mpsc::error::TrySendError::Closed(_)) => PushOutcome::Closed,
            },
        }
    }

    /// Whether the consumer side is gone.
    pub fn is_closed(&self) -> bool {
        match &self.inner {
            SenderKind::Unbounded(tx) => tx.is_closed(),
            SenderKind::Bounded(tx) => tx.is_closed(),
        }
    }
}

/// The single-consumer half of a fan-out queue. Yields items in insertion
/// order and ends once every sender is dropped and the buffer drains.
#[derive(Debug)]
pub struct QueueStream<T> {
    inner: StreamKind<T>,
}

#[derive(Debug)]
enum StreamKind<T> {
    Unbounded(UnboundedReceiverStream<T>),
    Bounded(ReceiverStream<T>),
}

impl<T> Stream for QueueStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        match &mut self.get_mut().inner {
            StreamKind::Unbounded(stream) => Pin::new(stream).poll_next(cx),
            StreamKind::Bounded(stream) => Pin::new(stream).poll_next(cx),
        }
    }
}

/// Creates an unbounded queue: the registry's default for subscribers.
pub fn queue<T>() -> (QueueSender<T>, QueueStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();

    (
        QueueSender {
            inner: SenderKind::Unbounded(tx),
        },
        QueueStream {
            inner: StreamKind::Unbounded(UnboundedReceiverStream::new(rx)),
        },
    )
}

/// Creates a bounded queue that reports overflow instead of blocking. Used
/// where a slow consumer must be detected rather than buffered forever.
pub fn bounded_queue<T>(capacity: usize) -> (QueueSender<T>, QueueStream<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    (
        QueueSender {
            inner: SenderKind::Bounded(tx),
        },
        QueueStream {
            inner: StreamKind::Bounded(ReceiverStream::new(rx)),
        },
    )
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn yields_in_insertion_order() {
        let (tx, mut rx) = queue();

        for i in 0..5 {
            assert_eq!(tx.push(i), PushOutcome::Delivered);
        }
        drop(tx);

        let items: Vec<i32> = (&mut rx).collect().await;
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn dropping_the_sender_ends_the_stream_after_drain() {
        let (tx, mut rx) = queue();

        tx.push("only");
        drop(tx);

        assert_eq!(rx.next().await, Some("only"));
        assert_eq!(rx.next().await, None);
    }

    #[tokio::test]
    async fn push_after_close_reports_closed() {
        let (tx, rx) = queue();

        drop(rx);

        assert_eq!(tx.push(1), PushOutcome::Closed);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn bounded_queue_reports_overflow() {
        let (tx, mut rx) = bounded_queue(2);

        assert_eq!(tx.push(1), PushOutcome::Delivered);
        assert_eq!(tx.push(2), PushOutcome::Delivered);
        assert_eq!(tx.push(3), PushOutcome::Overflow);

        assert_eq!(rx.next().await, Some(1));
        assert_eq!(tx.push(4), PushOutcome::Delivered);
    }
}
