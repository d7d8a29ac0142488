use chalet_shared::DomainEvent;
use tokio::sync::broadcast;

/// Outbound notification of committed changes.
///
/// Publishing is fire-and-forget: a commit never fails because nobody listens.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// In-process fan-out over a `tokio::sync::broadcast` channel.
#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: DomainEvent) {
        let topic = event.topic();
        match self.tx.send(event) {
            Ok(receivers) => tracing::debug!(topic, receivers, "event published"),
            Err(_) => tracing::trace!(topic, "event dropped, no subscribers"),
        }
    }
}

pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: DomainEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chalet_shared::models::events::BookingCancelledEvent;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();

        let booking_id = Uuid::new_v4();
        publisher.publish(DomainEvent::BookingCancelled(BookingCancelledEvent {
            booking_id,
            listing_id: Uuid::new_v4(),
            cancelled_by: Uuid::new_v4(),
            timestamp: 0,
        }));

        match rx.recv().await.unwrap() {
            DomainEvent::BookingCancelled(e) => assert_eq!(e.booking_id, booking_id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let publisher = BroadcastPublisher::new(8);
        publisher.publish(DomainEvent::BookingCancelled(BookingCancelledEvent {
            booking_id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            cancelled_by: Uuid::new_v4(),
            timestamp: 0,
        }));
    }
}
