use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

/// Topic keys must be cheap to copy and hashable.
pub trait Topic: Copy + Eq + Hash + Send + Sync + 'static {}

impl<T> Topic for T where T: Copy + Eq + Hash + Send + Sync + 'static {}

#[derive(Debug, Error)]
pub enum BusError {
    /// A subscriber rejected or failed to process an event.
    #[error("event sink failed: {0}")]
    Sink(String),
}

impl BusError {
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink(message.into())
    }
}

/// A subscriber callback. Identity (the `Arc` pointer) is what makes
/// subscription and unsubscription idempotent.
#[async_trait]
pub trait EventSink<E>: Send + Sync
where
    E: Event,
{
    async fn handle(&self, event: &E) -> Result<(), BusError>;
}

/// In-process pub/sub bus.
///
/// `emit` dispatches to every sink registered for the topic concurrently and
/// awaits all of them before returning; the first sink error is then
/// propagated to the emitter. Subscribers therefore all observe the event
/// even when one of them fails.
pub struct EventBus<K, E>
where
    K: Topic,
    E: Event,
{
    subscribers: Mutex<HashMap<K, Vec<Arc<dyn EventSink<E>>>>>,
}

impl<K, E> EventBus<K, E>
where
    K: Topic,
    E: Event,
{
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a sink for a topic. Registering the same `Arc` twice is a
    /// no-op.
    pub fn subscribe(&self, topic: K, sink: Arc<dyn EventSink<E>>) {
        let mut subscribers = self.subscribers.lock();
        let sinks = subscribers.entry(topic).or_default();
        if !sinks.iter().any(|existing| Arc::ptr_eq(existing, &sink)) {
            sinks.push(sink);
        }
    }

    /// Remove a previously registered sink, matched by pointer identity.
    pub fn unsubscribe(&self, topic: K, sink: &Arc<dyn EventSink<E>>) {
        let mut subscribers = self.subscribers.lock();
        if let Some(sinks) = subscribers.get_mut(&topic) {
            sinks.retain(|existing| !Arc::ptr_eq(existing, sink));
        }
    }

    pub fn subscriber_count(&self, topic: K) -> usize {
        self.subscribers
            .lock()
            .get(&topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub async fn emit(&self, topic: K, event: &E) -> Result<(), BusError> {
        let sinks: Vec<Arc<dyn EventSink<E>>> = {
            let subscribers = self.subscribers.lock();
            match subscribers.get(&topic) {
                Some(sinks) => sinks.clone(),
                None => return Ok(()),
            }
        };

        let results =
            futures::future::join_all(sinks.iter().map(|sink| sink.handle(event))).await;
        results.into_iter().collect()
    }
}

impl<K, E> Default for EventBus<K, E>
where
    K: Topic,
    E: Event,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Sink that forwards events into an mpsc channel, so callers can await
/// events without implementing `EventSink` themselves. A dropped receiver
/// does not fail the emit: the sink just stops delivering until it is
/// unsubscribed.
pub struct ChannelSink<E> {
    tx: mpsc::Sender<E>,
}

impl<E> ChannelSink<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<E>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl<E> EventSink<E> for ChannelSink<E>
where
    E: Event,
{
    async fn handle(&self, event: &E) -> Result<(), BusError> {
        if self.tx.send(event.clone()).await.is_err() {
            tracing::debug!("event channel receiver dropped, event discarded");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    enum TestTopic {
        Execution,
    }

    struct CountingSink {
        seen: AtomicUsize,
        fail: bool,
    }

    impl CountingSink {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                seen: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl EventSink<String> for CountingSink {
        async fn handle(&self, _event: &String) -> Result<(), BusError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BusError::sink("boom"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn subscribe_is_idempotent_by_identity() {
        let bus: EventBus<TestTopic, String> = EventBus::new();
        let sink = CountingSink::new(false);
        bus.subscribe(TestTopic::Execution, sink.clone());
        bus.subscribe(TestTopic::Execution, sink.clone());
        assert_eq!(bus.subscriber_count(TestTopic::Execution), 1);

        bus.emit(TestTopic::Execution, &"hello".to_string())
            .await
            .unwrap();
        assert_eq!(sink.seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_removes_by_identity() {
        let bus: EventBus<TestTopic, String> = EventBus::new();
        let first = CountingSink::new(false);
        let second = CountingSink::new(false);
        bus.subscribe(TestTopic::Execution, first.clone());
        bus.subscribe(TestTopic::Execution, second.clone());

        let handle: Arc<dyn EventSink<String>> = first.clone();
        bus.unsubscribe(TestTopic::Execution, &handle);
        assert_eq!(bus.subscriber_count(TestTopic::Execution), 1);

        bus.emit(TestTopic::Execution, &"hello".to_string())
            .await
            .unwrap();
        assert_eq!(first.seen.load(Ordering::SeqCst), 0);
        assert_eq!(second.seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_sink_does_not_starve_others() {
        let bus: EventBus<TestTopic, String> = EventBus::new();
        let ok_a = CountingSink::new(false);
        let failing = CountingSink::new(true);
        let ok_b = CountingSink::new(false);
        bus.subscribe(TestTopic::Execution, ok_a.clone());
        bus.subscribe(TestTopic::Execution, failing.clone());
        bus.subscribe(TestTopic::Execution, ok_b.clone());

        let result = bus.emit(TestTopic::Execution, &"hello".to_string()).await;
        assert!(result.is_err());
        assert_eq!(ok_a.seen.load(Ordering::SeqCst), 1);
        assert_eq!(failing.seen.load(Ordering::SeqCst), 1);
        assert_eq!(ok_b.seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let bus: EventBus<TestTopic, String> = EventBus::new();
        let (sink, mut rx) = ChannelSink::new(8);
        bus.subscribe(TestTopic::Execution, sink);

        bus.emit(TestTopic::Execution, &"one".to_string())
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), "one");
    }
}
