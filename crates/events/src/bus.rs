//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`MarketEvent`]s. It is
//! shared via `Arc<EventBus>` between the negotiation engine (publisher)
//! and the notification dispatcher (subscriber).

use tokio::sync::broadcast;

use crate::market::MarketEvent;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust,ignore
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(MarketEvent::NewRequestAvailable { request });
/// ```
pub struct EventBus {
    sender: broadcast::Sender<MarketEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: MarketEvent) {
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::tests::sample_request;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(MarketEvent::NewRequestAvailable {
            request: sample_request(42),
        });

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.kind(), "new_request_available");
        assert_eq!(received.request().id, 42);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        bus.publish(MarketEvent::NewRequestAvailable {
            request: sample_request(1),
        });

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(e1.request().id, 1);
        assert_eq!(e2.request().id, 1);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(MarketEvent::NewRequestAvailable {
            request: sample_request(7),
        });
    }

    #[tokio::test]
    async fn slow_receiver_observes_lag() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for id in 0..4 {
            bus.publish(MarketEvent::NewRequestAvailable {
                request: sample_request(id),
            });
        }

        let err = rx.recv().await.unwrap_err();
        assert!(matches!(err, broadcast::error::RecvError::Lagged(2)));
    }
}
