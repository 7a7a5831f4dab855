use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use xecare_domain::bell::DEFAULT_RING_HOLD;
use xecare_domain::sync_state::ApplyOutcome;
use xecare_domain::{Identity, NotificationSnapshot, SyncAction};

use crate::api::NotificationApi;
use crate::bell::BellHandle;
use crate::bus::{NotificationBus, NotificationEvent};
use crate::error::ApiError;
use crate::store::NotificationStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    pub bell_hold: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            bell_hold: DEFAULT_RING_HOLD,
        }
    }
}

#[derive(Debug, Default)]
struct Reconcile {
    // Ids the last list load dropped as addressed to someone else.
    foreign: HashSet<i64>,
    // Server count that already caused a reload without converging.
    reloaded_for: Option<u32>,
}

/// Notification state and operations for one identity.
pub struct NotificationSync<A> {
    api: Arc<A>,
    store: Arc<NotificationStore>,
    bus: NotificationBus,
    identity: Identity,
    reconcile: Mutex<Reconcile>,
}

impl<A: NotificationApi> NotificationSync<A> {
    pub fn new(api: Arc<A>, identity: Identity, bus: NotificationBus) -> Self {
        Self {
            api,
            store: Arc::new(NotificationStore::new()),
            bus,
            identity,
            reconcile: Mutex::new(Reconcile::default()),
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        self.store.snapshot()
    }

    /// Replaces the list with the server snapshot. Failures keep the
    /// previous list.
    #[instrument(skip(self), fields(identity = self.identity.id))]
    pub async fn load_notifications(&self) {
        let revision = self.store.revision();
        self.store.dispatch(SyncAction::LoadStarted);
        match self.api.my_notifications().await {
            Ok(records) => {
                let (records, foreign): (Vec<_>, Vec<_>) = records
                    .into_iter()
                    .partition(|record| record.is_actionable_by(&self.identity));
                if !foreign.is_empty() {
                    warn!(
                        dropped = foreign.len(),
                        "ignoring notifications addressed to another recipient"
                    );
                }
                self.reconcile.lock().foreign = foreign.iter().map(|record| record.id).collect();
                let count = records.len();
                match self
                    .store
                    .dispatch(SyncAction::ListLoaded { records, revision })
                {
                    ApplyOutcome::Stale => debug!("notification list superseded by a local change"),
                    _ => debug!(count, "notification list applied"),
                }
            }
            Err(err) => {
                warn!(%err, "loading notifications failed, keeping previous list");
                self.store.dispatch(SyncAction::LoadFailed);
            }
        }
    }

    #[instrument(skip(self), fields(identity = self.identity.id))]
    pub async fn load_unread_count(&self) {
        let revision = self.store.revision();
        let count = match self.api.unread_count().await {
            Ok(count) => count,
            Err(err) => {
                warn!(%err, "loading unread count failed, keeping previous value");
                return;
            }
        };
        match self
            .store
            .dispatch(SyncAction::CountLoaded { count, revision })
        {
            ApplyOutcome::Diverged { server, local } => {
                let retry = self.reconcile.lock().reloaded_for.replace(server) != Some(server);
                if retry {
                    info!(server, local, "unread count disagrees with list, reloading");
                    self.load_notifications().await;
                } else {
                    debug!(server, local, "list already reloaded for this count");
                }
            }
            ApplyOutcome::Stale => debug!(count, "unread count superseded by a local change"),
            ApplyOutcome::Applied | ApplyOutcome::Unchanged => {
                self.reconcile.lock().reloaded_for = None;
            }
            ApplyOutcome::Untracked => {}
        }
    }

    /// Marks one notification read locally, then on the server. A server
    /// failure rolls the local change back and is returned.
    ///
    /// Ids missing from the loaded list are still sent to the server, and the
    /// list is reloaded afterwards to pick them up.
    #[instrument(skip(self))]
    pub async fn mark_as_read(&self, id: i64) -> Result<(), ApiError> {
        if self.reconcile.lock().foreign.contains(&id) {
            warn!("notification belongs to another recipient, not marking it");
            return Ok(());
        }
        let outcome = self.store.dispatch(SyncAction::MarkRead { id });
        if !matches!(outcome, ApplyOutcome::Applied | ApplyOutcome::Untracked) {
            debug!("already read");
            return Ok(());
        }
        if let Err(err) = self.api.mark_as_read(id).await {
            warn!(%err, "mark as read rejected, restoring unread state");
            self.store.dispatch(SyncAction::RevertMarkRead { id });
            return Err(err);
        }
        if outcome == ApplyOutcome::Untracked {
            debug!("marked a notification the list has not seen, reloading");
            self.load_notifications().await;
        }
        Ok(())
    }

    /// Clears every unread flag immediately; the server call runs in the
    /// background and a failure is only logged.
    pub fn mark_all_as_read(&self) -> JoinHandle<()> {
        self.store.dispatch(SyncAction::MarkAllRead);
        let api = self.api.clone();
        tokio::spawn(async move {
            if let Err(err) = api.mark_all_as_read().await {
                warn!(%err, "mark all as read failed on the server");
            }
        })
    }

    pub async fn handle_event(&self, event: NotificationEvent) {
        match event {
            NotificationEvent::RefreshRequested => self.load_unread_count().await,
            NotificationEvent::NewNotification { count: Some(count) } => {
                if self.store.dispatch(SyncAction::CountHint { count }).changed() {
                    debug!(count, "unread count raised by hint");
                }
            }
            NotificationEvent::NewNotification { count: None } => {}
        }
    }

    /// Starts the session: an initial load, then the unread-count poll. The
    /// returned handle stops everything when shut down or dropped.
    pub fn start(self, config: &SyncConfig) -> NotificationSession<A> {
        let sync = Arc::new(self);
        let events = sync.bus.subscribe();
        let bell = BellHandle::spawn(&sync.store, &sync.bus, config.bell_hold);
        let (shutdown, stop) = oneshot::channel();
        let task = tokio::spawn(poll(sync.clone(), config.poll_interval, events, stop));
        info!(
            identity = sync.identity.id,
            interval_ms = config.poll_interval.as_millis() as u64,
            "notification session started"
        );
        NotificationSession {
            sync,
            bell,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }
}

async fn poll<A: NotificationApi>(
    sync: Arc<NotificationSync<A>>,
    period: Duration,
    mut events: broadcast::Receiver<NotificationEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    tokio::join!(sync.load_notifications(), sync.load_unread_count());

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => sync.load_unread_count().await,
            event = events.recv() => match event {
                Ok(event) => sync.handle_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("notification polling stopped");
}

/// A running notification session. Dropping it cancels the poll and the bell.
pub struct NotificationSession<A> {
    sync: Arc<NotificationSync<A>>,
    bell: BellHandle,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<A: NotificationApi> NotificationSession<A> {
    pub fn sync(&self) -> &Arc<NotificationSync<A>> {
        &self.sync
    }

    pub fn bell(&self) -> &BellHandle {
        &self.bell
    }

    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(%err, "notification poll task ended abnormally");
            }
        }
        info!(identity = self.sync.identity.id, "notification session closed");
    }
}

impl<A> Drop for NotificationSession<A> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
