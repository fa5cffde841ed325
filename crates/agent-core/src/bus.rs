//! Thin wrapper binding the generic bus to the execution event model.

use std::sync::Arc;

use webpilot_event_bus::{ChannelSink, EventBus, EventSink};

use crate::errors::AgentError;
use crate::events::{Event, EventType};

/// Pub/sub bus carrying execution events. The topic is taken from the event
/// itself, so emitters never route by hand.
pub struct ExecutionBus {
    inner: EventBus<EventType, Event>,
}

impl ExecutionBus {
    pub fn new() -> Self {
        Self {
            inner: EventBus::new(),
        }
    }

    pub fn subscribe(&self, sink: Arc<dyn EventSink<Event>>) {
        self.inner.subscribe(EventType::Execution, sink);
    }

    pub fn unsubscribe(&self, sink: &Arc<dyn EventSink<Event>>) {
        self.inner.unsubscribe(EventType::Execution, sink);
    }

    /// Subscribe a channel and return its receiving end.
    pub fn subscribe_channel(&self, capacity: usize) -> tokio::sync::mpsc::Receiver<Event> {
        let (sink, rx) = ChannelSink::new(capacity);
        self.subscribe(sink);
        rx
    }

    pub async fn emit(&self, event: Event) -> Result<(), AgentError> {
        self.inner.emit(event.kind, &event).await?;
        Ok(())
    }
}

impl Default for ExecutionBus {
    fn default() -> Self {
        Self::new()
    }
}
