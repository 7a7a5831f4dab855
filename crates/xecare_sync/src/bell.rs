use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use xecare_domain::bell::{BellAction, BellIndicator, BellView};
use xecare_domain::NotificationSnapshot;

use crate::bus::{NotificationBus, NotificationEvent};
use crate::store::NotificationStore;

/// Drives a [`BellIndicator`] from the store and the event bus and publishes
/// [`BellView`]s. The task stops when the handle is dropped.
pub struct BellHandle {
    view: watch::Receiver<BellView>,
    task: JoinHandle<()>,
}

impl BellHandle {
    pub fn spawn(store: &NotificationStore, bus: &NotificationBus, hold: Duration) -> Self {
        let counts = store.subscribe();
        let events = bus.subscribe();
        let (publish, view) = watch::channel(BellView::default());
        let task = tokio::spawn(drive(BellIndicator::new(hold), counts, events, publish));
        Self { view, task }
    }

    pub fn view(&self) -> BellView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BellView> {
        self.view.clone()
    }

    /// Opens the notification listing; never marks anything read.
    pub fn click(&self) -> BellAction {
        BellIndicator::default().click()
    }
}

impl Drop for BellHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn drive(
    mut bell: BellIndicator,
    mut counts: watch::Receiver<NotificationSnapshot>,
    mut events: broadcast::Receiver<NotificationEvent>,
    publish: watch::Sender<BellView>,
) {
    let initial = counts.borrow_and_update().unread_count;
    bell.observe(initial, now());
    publish_view(&publish, &bell);

    loop {
        let deadline = bell.ringing_until();
        let wake = deadline.map(Instant::from_std).unwrap_or_else(Instant::now);
        tokio::select! {
            changed = counts.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = counts.borrow_and_update().unread_count;
                if bell.observe(count, now()) {
                    debug!(count, "unread count rose, ringing");
                }
            }
            event = events.recv() => match event {
                Ok(NotificationEvent::NewNotification { .. }) => {
                    debug!("new notification signalled, ringing");
                    bell.ring(now());
                }
                Ok(NotificationEvent::RefreshRequested) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::time::sleep_until(wake), if deadline.is_some() => {
                bell.settle(now());
            }
        }
        publish_view(&publish, &bell);
    }
}

fn publish_view(publish: &watch::Sender<BellView>, bell: &BellIndicator) {
    let next = bell.view(now());
    publish.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}
