use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::types::{EventEnvelope, RunEvent};

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of run lifecycle events to any number of subscribers.
///
/// Delivery is best effort: with no subscribers an event is dropped, and a
/// subscriber that falls more than the channel capacity behind loses the oldest
/// events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    published: Arc<AtomicUsize>,
}

impl EventBus {
    /// Creates a bus that buffers up to 256 events per subscriber.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus buffering `capacity` events per subscriber.
    ///
    /// Panics if `capacity` is zero, as `tokio::sync::broadcast::channel` does.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: RunEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let nomad_job_id = event.nomad_job_id();
        let delivered = self.sender.send(EventEnvelope::new(event)).unwrap_or(0);
        trace!(job_id = %nomad_job_id, delivered, "Published run event");
        delivered
    }

    /// Receives every event published after this call; earlier ones are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Number of live receivers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total events published through this bus and its clones, delivered or not.
    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .field("published_count", &self.published_count())
            .finish()
    }
}
