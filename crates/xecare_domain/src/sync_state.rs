//! Notification state for one authenticated session.
//!
//! Every mutation is expressed as a [`SyncAction`] and applied through
//! [`NotificationSyncState::apply`], so callers that share the state behind a
//! lock get serialized read-modify-write on the unread count for free.
//!
//! Fetch results carry the [`revision`](NotificationSyncState::revision) that
//! was current when the request was issued. Local optimistic mutations bump
//! the revision, which turns any result issued before them into a stale one
//! that is dropped instead of clobbering the optimistic value.

use std::collections::HashSet;

use serde::Serialize;

use crate::notifications::NotificationRecord;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    LoadStarted,
    LoadFailed,
    ListLoaded {
        records: Vec<NotificationRecord>,
        revision: u64,
    },
    CountLoaded {
        count: u32,
        revision: u64,
    },
    MarkRead {
        id: i64,
    },
    RevertMarkRead {
        id: i64,
    },
    MarkAllRead,
    CountHint {
        count: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Unchanged,
    /// The result was issued before a local mutation and was dropped.
    Stale,
    /// The server count disagrees with the loaded list; the list needs a reload.
    Diverged { server: u32, local: u32 },
    /// A read for an id missing from the loaded list. Nothing local changed
    /// but the server still has to be told, and the list is now outdated.
    Untracked,
}

impl ApplyOutcome {
    pub fn changed(self) -> bool {
        matches!(self, Self::Applied)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSnapshot {
    pub notifications: Vec<NotificationRecord>,
    pub unread_count: u32,
    pub is_loading: bool,
}

#[derive(Debug, Default)]
pub struct NotificationSyncState {
    notifications: Vec<NotificationRecord>,
    unread_count: u32,
    is_loading: bool,
    list_loaded: bool,
    revision: u64,
    // Ids marked read while only the count is known.
    pending_reads: HashSet<i64>,
    // Ids marked read that the loaded list does not contain yet.
    untracked_reads: HashSet<i64>,
}

impl NotificationSyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> &[NotificationRecord] {
        &self.notifications
    }

    pub fn unread_count(&self) -> u32 {
        self.unread_count
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn list_loaded(&self) -> bool {
        self.list_loaded
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_read(&self, id: i64) -> Option<bool> {
        self.notifications
            .iter()
            .find(|record| record.id == id)
            .map(|record| record.is_read)
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        NotificationSnapshot {
            notifications: self.notifications.clone(),
            unread_count: self.unread_count,
            is_loading: self.is_loading,
        }
    }

    pub fn apply(&mut self, action: SyncAction) -> ApplyOutcome {
        match action {
            SyncAction::LoadStarted => self.set_loading(true),
            SyncAction::LoadFailed => self.set_loading(false),
            SyncAction::ListLoaded { records, revision } => {
                self.is_loading = false;
                if revision != self.revision {
                    return ApplyOutcome::Stale;
                }
                self.notifications = records;
                self.list_loaded = true;
                self.pending_reads.clear();
                self.untracked_reads.clear();
                self.unread_count = self.derived_unread();
                ApplyOutcome::Applied
            }
            SyncAction::CountLoaded { count, revision } => {
                if revision != self.revision {
                    return ApplyOutcome::Stale;
                }
                if self.list_loaded {
                    let local = self.derived_unread();
                    if count != local {
                        return ApplyOutcome::Diverged {
                            server: count,
                            local,
                        };
                    }
                    return self.set_unread(local);
                }
                self.set_unread(count)
            }
            SyncAction::MarkRead { id } => {
                if self.list_loaded {
                    let Some(record) = self.notifications.iter_mut().find(|r| r.id == id) else {
                        if !self.untracked_reads.insert(id) {
                            return ApplyOutcome::Unchanged;
                        }
                        self.revision += 1;
                        return ApplyOutcome::Untracked;
                    };
                    if record.is_read {
                        return ApplyOutcome::Unchanged;
                    }
                    record.is_read = true;
                } else if !self.pending_reads.insert(id) {
                    return ApplyOutcome::Unchanged;
                }
                self.unread_count = self.unread_count.saturating_sub(1);
                self.revision += 1;
                ApplyOutcome::Applied
            }
            SyncAction::RevertMarkRead { id } => {
                if self.list_loaded {
                    let Some(record) = self.notifications.iter_mut().find(|r| r.id == id) else {
                        self.untracked_reads.remove(&id);
                        return ApplyOutcome::Unchanged;
                    };
                    if !record.is_read {
                        return ApplyOutcome::Unchanged;
                    }
                    record.is_read = false;
                } else if !self.pending_reads.remove(&id) {
                    return ApplyOutcome::Unchanged;
                }
                self.unread_count += 1;
                self.revision += 1;
                ApplyOutcome::Applied
            }
            SyncAction::MarkAllRead => {
                for record in &mut self.notifications {
                    record.is_read = true;
                }
                self.unread_count = 0;
                self.revision += 1;
                ApplyOutcome::Applied
            }
            SyncAction::CountHint { count } => {
                if count <= self.unread_count {
                    return ApplyOutcome::Unchanged;
                }
                self.unread_count = count;
                self.revision += 1;
                ApplyOutcome::Applied
            }
        }
    }

    fn derived_unread(&self) -> u32 {
        self.notifications.iter().filter(|r| !r.is_read).count() as u32
    }

    fn set_unread(&mut self, count: u32) -> ApplyOutcome {
        if self.unread_count == count {
            ApplyOutcome::Unchanged
        } else {
            self.unread_count = count;
            ApplyOutcome::Applied
        }
    }

    fn set_loading(&mut self, loading: bool) -> ApplyOutcome {
        if self.is_loading == loading {
            ApplyOutcome::Unchanged
        } else {
            self.is_loading = loading;
            ApplyOutcome::Applied
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{NotificationType, RecipientType};
    use chrono::{TimeZone, Utc};

    fn record(id: i64, is_read: bool) -> NotificationRecord {
        NotificationRecord {
            id,
            recipient_type: RecipientType::User,
            recipient_id: 1,
            kind: NotificationType::General,
            title: format!("n{id}"),
            message: String::new(),
            is_read,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            priority: None,
            category: None,
            related_id: None,
            related_type: None,
            action_url: None,
        }
    }

    fn loaded(records: Vec<NotificationRecord>) -> NotificationSyncState {
        let mut state = NotificationSyncState::new();
        let revision = state.revision();
        state.apply(SyncAction::ListLoaded { records, revision });
        state
    }

    #[test]
    fn list_load_derives_unread_count() {
        let state = loaded(vec![record(1, false), record(2, true), record(3, false)]);
        assert_eq!(state.unread_count(), 2);
        assert!(state.list_loaded());
    }

    #[test]
    fn mark_read_is_idempotent() {
        let mut state = loaded(vec![record(1, false)]);
        assert_eq!(state.apply(SyncAction::MarkRead { id: 1 }), ApplyOutcome::Applied);
        assert_eq!(state.apply(SyncAction::MarkRead { id: 1 }), ApplyOutcome::Unchanged);
        assert_eq!(state.is_read(1), Some(true));
        assert_eq!(state.unread_count(), 0);
    }

    #[test]
    fn mark_read_of_unlisted_id_is_untracked_once() {
        let mut state = loaded(vec![record(1, false)]);
        let issued_at = state.revision();
        assert_eq!(state.apply(SyncAction::MarkRead { id: 2 }), ApplyOutcome::Untracked);
        assert_eq!(state.apply(SyncAction::MarkRead { id: 2 }), ApplyOutcome::Unchanged);
        assert_eq!(state.unread_count(), 1);
        assert_eq!(state.is_read(2), None);
        // Fetches issued before the read are dropped.
        assert_eq!(
            state.apply(SyncAction::CountLoaded {
                count: 2,
                revision: issued_at
            }),
            ApplyOutcome::Stale
        );

        // A failed server call makes the id markable again.
        assert_eq!(
            state.apply(SyncAction::RevertMarkRead { id: 2 }),
            ApplyOutcome::Unchanged
        );
        assert_eq!(state.apply(SyncAction::MarkRead { id: 2 }), ApplyOutcome::Untracked);
    }

    #[test]
    fn mark_read_before_list_load_floors_at_zero() {
        let mut state = NotificationSyncState::new();
        assert_eq!(state.apply(SyncAction::MarkRead { id: 9 }), ApplyOutcome::Applied);
        assert_eq!(state.unread_count(), 0);
        assert_eq!(state.apply(SyncAction::MarkRead { id: 9 }), ApplyOutcome::Unchanged);
    }

    #[test]
    fn revert_restores_unread() {
        let mut state = loaded(vec![record(1, false), record(2, false)]);
        state.apply(SyncAction::MarkRead { id: 2 });
        assert_eq!(state.unread_count(), 1);
        assert_eq!(
            state.apply(SyncAction::RevertMarkRead { id: 2 }),
            ApplyOutcome::Applied
        );
        assert_eq!(state.is_read(2), Some(false));
        assert_eq!(state.unread_count(), 2);
    }

    #[test]
    fn count_issued_before_optimistic_update_is_stale() {
        let mut state = NotificationSyncState::new();
        let revision = state.revision();
        state.apply(SyncAction::CountLoaded { count: 3, revision });
        let issued_at = state.revision();
        state.apply(SyncAction::MarkRead { id: 5 });
        assert_eq!(
            state.apply(SyncAction::CountLoaded {
                count: 3,
                revision: issued_at
            }),
            ApplyOutcome::Stale
        );
        assert_eq!(state.unread_count(), 2);
    }

    #[test]
    fn diverging_server_count_requests_reload() {
        let mut state = loaded(vec![record(1, false)]);
        let revision = state.revision();
        assert_eq!(
            state.apply(SyncAction::CountLoaded { count: 4, revision }),
            ApplyOutcome::Diverged { server: 4, local: 1 }
        );
        assert_eq!(state.unread_count(), 1);
    }

    #[test]
    fn hint_only_raises_count() {
        let mut state = NotificationSyncState::new();
        assert_eq!(state.apply(SyncAction::CountHint { count: 1 }), ApplyOutcome::Applied);
        assert_eq!(state.apply(SyncAction::CountHint { count: 1 }), ApplyOutcome::Unchanged);
        assert_eq!(state.unread_count(), 1);
    }

    #[test]
    fn stale_list_still_clears_loading_flag() {
        let mut state = NotificationSyncState::new();
        let revision = state.revision();
        state.apply(SyncAction::LoadStarted);
        state.apply(SyncAction::MarkAllRead);
        assert_eq!(
            state.apply(SyncAction::ListLoaded {
                records: vec![record(1, false)],
                revision
            }),
            ApplyOutcome::Stale
        );
        assert!(!state.is_loading());
        assert!(state.notifications().is_empty());
    }
}
