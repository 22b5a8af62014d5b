//! Progress sinks: observers that receive executor events as they happen.

use council_common::ProgressEvent;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receives progress events synchronously, in dispatch order.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// Publishes each event to every registered sink, in registration order.
///
/// Registering the same sink twice delivers every event to it twice.
#[derive(Default)]
pub struct ProgressFanout {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl ProgressFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: Arc<dyn ProgressSink>) {
        self.sinks.push(sink);
    }

    pub fn with(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.subscribe(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ProgressSink for ProgressFanout {
    fn on_event(&self, event: &ProgressEvent) {
        for sink in &self.sinks {
            sink.on_event(event);
        }
    }
}

/// Forwards events into an unbounded channel with a single reader.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_event(&self, event: &ProgressEvent) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.tx.send(event.clone());
    }
}
