use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

use xecare_domain::sync_state::ApplyOutcome;
use xecare_domain::{NotificationSnapshot, NotificationSyncState, SyncAction};

/// Shared owner of [`NotificationSyncState`]. Actions are applied one at a
/// time under the lock and every change is broadcast as a snapshot.
#[derive(Debug)]
pub struct NotificationStore {
    state: Mutex<NotificationSyncState>,
    snapshots: watch::Sender<NotificationSnapshot>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(NotificationSnapshot::default());
        Self {
            state: Mutex::new(NotificationSyncState::new()),
            snapshots,
        }
    }

    pub fn dispatch(&self, action: SyncAction) -> ApplyOutcome {
        let mut state = self.state.lock();
        let outcome = state.apply(action);
        trace!(?outcome, revision = state.revision(), "action applied");
        // Stale list results still clear the loading flag.
        if outcome != ApplyOutcome::Unchanged {
            let next = state.snapshot();
            self.snapshots.send_if_modified(|current| {
                if *current == next {
                    false
                } else {
                    *current = next;
                    true
                }
            });
        }
        outcome
    }

    pub fn revision(&self) -> u64 {
        self.state.lock().revision()
    }

    pub fn unread_count(&self) -> u32 {
        self.state.lock().unread_count()
    }

    pub fn is_read(&self, id: i64) -> Option<bool> {
        self.state.lock().is_read(id)
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        self.state.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationSnapshot> {
        self.snapshots.subscribe()
    }
}
