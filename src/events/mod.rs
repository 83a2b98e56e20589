//! Event bus for session status and lifecycle notifications

pub mod types;

pub use types::{SessionEvent, SessionRole};

use tokio::sync::broadcast;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Broadcasts session events to every subscriber
///
/// Events published with no subscriber are dropped. A subscriber that falls
/// too far behind receives `Lagged` and misses events.
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(SessionEvent::ViewerCountChanged { count: 1 });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::ViewerCountChanged { count: 1 }));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(SessionEvent::status(SessionRole::Streamer, "Waiting for viewers..."));

        assert!(matches!(rx1.recv().await.unwrap(), SessionEvent::Status { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), SessionEvent::Status { .. }));
    }

    #[test]
    fn test_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(SessionEvent::ViewerCountChanged { count: 0 });
    }
}
