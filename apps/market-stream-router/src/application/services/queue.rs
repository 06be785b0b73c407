//! Shared Inbound-Event Queue
//!
//! Bounded FIFO carrying [`InboundEvent`]s from every stream's output relay
//! (and from the surrounding system) to the single dispatcher. A full
//! queue suspends the producer instead of dropping events.

use tokio::sync::mpsc;

use crate::domain::streaming::InboundEvent;

/// Errors raised by the event queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The consumer side has been dropped.
    #[error("event queue closed")]
    Closed,
    /// The queue is at capacity.
    #[error("event queue full")]
    Full,
}

/// Create a bounded event queue.
///
/// # Panics
///
/// Panics if `capacity` is zero. Configuration rejects a zero capacity
/// before a queue is built.
#[must_use]
pub fn event_queue(capacity: usize) -> (EventQueue, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventQueue { tx }, EventReceiver { rx })
}

/// Producer handle; cheap to clone and hand to each stream runner.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<InboundEvent>,
}

impl EventQueue {
    /// Enqueue an event, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the receiver has been dropped.
    pub async fn put(&self, event: InboundEvent) -> Result<(), QueueError> {
        self.tx.send(event).await.map_err(|_| QueueError::Closed)
    }

    /// Enqueue an event without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] at capacity and [`QueueError::Closed`]
    /// if the receiver has been dropped.
    pub fn try_put(&self, event: InboundEvent) -> Result<(), QueueError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Maximum number of queued events.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Whether the receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer handle, owned by the dispatcher.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<InboundEvent>,
}

impl EventReceiver {
    /// Wait for the next event. Returns `None` once every producer is gone
    /// and the queue is empty.
    pub async fn get(&mut self) -> Option<InboundEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is ready.
    pub fn try_get(&mut self) -> Option<InboundEvent> {
        self.rx.try_recv().ok()
    }

    /// Number of events waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no event is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
