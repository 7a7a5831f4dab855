use tokio::sync::broadcast;
use tracing::trace;

const BUS_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEvent {
    /// Something worth notifying about just happened on this page.
    NewNotification { count: Option<u32> },
    /// Ask the session to fetch the unread count now.
    RefreshRequested,
}

/// In-process publish/subscribe channel between unrelated UI pieces.
///
/// Delivery is best effort: events published with no subscriber are dropped,
/// and a subscriber that falls behind by more than the channel capacity skips
/// the oldest events.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<NotificationEvent>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Returns how many subscribers saw the event.
    pub fn publish(&self, event: NotificationEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(?event, "event published with no subscriber");
                0
            }
        }
    }

    pub fn new_notification(&self, count: Option<u32>) -> usize {
        self.publish(NotificationEvent::NewNotification { count })
    }

    pub fn request_refresh(&self) -> usize {
        self.publish(NotificationEvent::RefreshRequested)
    }

    /// The subscription ends when the returned receiver is dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_once_to_each_subscriber() {
        let bus = NotificationBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.new_notification(Some(1)), 2);
        assert_eq!(
            first.recv().await.unwrap(),
            NotificationEvent::NewNotification { count: Some(1) }
        );
        assert_eq!(
            second.recv().await.unwrap(),
            NotificationEvent::NewNotification { count: Some(1) }
        );
        assert!(first.try_recv().is_err());
    }

    #[test]
    fn dropping_receiver_unsubscribes() {
        let bus = NotificationBus::new();
        let receiver = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(receiver);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.request_refresh(), 0);
    }
}
