//! Event bus using tokio broadcast channel.
//!
//! Every store commit can emit several events, so emission must never wait
//! on a reader. Each subscriber has its own cursor into a bounded ring; a
//! subscriber that falls more than the capacity behind loses the oldest
//! events and resumes from the oldest one still retained.

use crate::events::KnowledgeEvent;
use tokio::sync::broadcast;

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Event bus for knowledge lifecycle events.
///
/// Cloning yields another handle to the same channel. Events are
/// fire-and-forget: with no subscribers they are dropped.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<KnowledgeEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with custom capacity
    ///
    /// `capacity` is how many events a subscriber may trail by before it
    /// starts losing them. Must be non-zero.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events
    ///
    /// The subscriber sees events emitted after this call only. If it falls
    /// behind by more than the capacity it misses events (lagged).
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Emit an event to all subscribers
    ///
    /// Non-blocking and infallible. If there are no subscribers the event is
    /// simply dropped.
    pub fn emit(&self, event: KnowledgeEvent) {
        // Err only means nobody is subscribed.
        let _ = self.sender.send(event);
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber to event bus
pub struct EventSubscriber {
    receiver: broadcast::Receiver<KnowledgeEvent>,
}

impl EventSubscriber {
    /// Receive the next event
    ///
    /// Returns `None` once every bus handle is dropped and the backlog is
    /// drained. Lag is logged and skipped rather than surfaced, so the next
    /// event returned is the oldest one still retained.
    pub async fn recv(&mut self) -> Option<KnowledgeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Log the lag but continue receiving
                    tracing::warn!("Event subscriber lagged by {} events", n);
                    continue;
                }
            }
        }
    }

    /// Try to receive an event without blocking
    ///
    /// `None` when nothing is queued. Unlike `recv`, a lag also yields `None`
    /// for this call; the following call resumes at the oldest retained event.
    pub fn try_recv(&mut self) -> Option<KnowledgeEvent> {
        self.receiver.try_recv().ok()
    }
}
