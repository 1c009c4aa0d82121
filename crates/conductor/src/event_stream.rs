//! A push-buffered, single-consumer sequence of typed events.
//!
//! One producer pushes events from whatever task is decoding a provider
//! stream or driving a turn; one consumer iterates them, typically to
//! re-publish at a higher level or to persist them. The stream is the sole
//! synchronization point between the two: no other shared state is needed
//! for a producer and consumer running on different tasks to hand events
//! back and forth safely.

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// The producer half: `push` enqueues, `end` marks the stream terminal.
///
/// Pushing after `end()` is a silent no-op, as is pushing once the consumer
/// has dropped its [`EventStream`] (cancellation) — in both cases the event
/// is simply discarded rather than erroring, since a producer has no useful
/// recovery action to take either way.
pub struct EventStreamProducer<T> {
    tx: Mutex<Option<mpsc::UnboundedSender<T>>>,
}

impl<T> EventStreamProducer<T> {
    /// Enqueue an event. No-ops once the stream has ended or the consumer
    /// has gone away.
    pub fn push(&self, event: T) {
        let guard = self.tx.lock();
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Mark the stream terminal. Already-buffered events are still
    /// delivered; the consumer observes end-of-stream exactly once, after
    /// draining them.
    pub fn end(&self) {
        *self.tx.lock() = None;
    }

    /// True once the consumer has dropped the stream without the producer
    /// having called `end()` first — i.e. the stream was cancelled rather
    /// than completed normally.
    pub fn is_cancelled(&self) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.is_closed(),
            None => false,
        }
    }
}

/// The consumer half. Not `Clone` — single-consumer by construction.
///
/// Wraps the raw `mpsc::UnboundedReceiver` in a [`tokio_stream`] adapter so
/// callers that already compose with `futures`/`futures_util` combinators
/// (`map`, `filter`, `take_while`, ...) can treat this like any other
/// `Stream` instead of hand-rolling a `recv().await` loop.
pub struct EventStream<T> {
    rx: UnboundedReceiverStream<T>,
}

impl<T> EventStream<T> {
    /// Await the next buffered event, or `None` exactly once at end-of-stream.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.next().await
    }
}

/// Construct a connected producer/consumer pair. No ordering guarantee is
/// given across two independently constructed streams — only within one.
pub fn event_stream<T>() -> (std::sync::Arc<EventStreamProducer<T>>, EventStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        std::sync::Arc::new(EventStreamProducer {
            tx: Mutex::new(Some(tx)),
        }),
        EventStream {
            rx: UnboundedReceiverStream::new(rx),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_buffered_events_in_push_order_then_ends() {
        let (producer, mut stream) = event_stream::<i32>();
        producer.push(1);
        producer.push(2);
        producer.push(3);
        producer.end();

        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.next().await, Some(2));
        assert_eq!(stream.next().await, Some(3));
        assert_eq!(stream.next().await, None);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn push_after_end_is_ignored() {
        let (producer, mut stream) = event_stream::<i32>();
        producer.push(1);
        producer.end();
        producer.push(2);

        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn dropping_the_consumer_is_observable_as_cancellation() {
        let (producer, stream) = event_stream::<i32>();
        assert!(!producer.is_cancelled());
        drop(stream);
        // is_closed() on a tokio mpsc sender is synchronous and immediate.
        assert!(producer.is_cancelled());
        producer.push(1); // silently dropped, not a panic
    }

    #[tokio::test]
    async fn producer_is_send_sync_across_tasks() {
        let (producer, mut stream) = event_stream::<i32>();
        let handle = tokio::spawn(async move {
            for i in 0..5 {
                producer.push(i);
            }
            producer.end();
        });
        let mut collected = Vec::new();
        while let Some(e) = stream.next().await {
            collected.push(e);
        }
        handle.await.unwrap();
        assert_eq!(collected, vec![0, 1, 2, 3, 4]);
    }
}
