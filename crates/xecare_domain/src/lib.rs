pub mod bell;
pub mod garage;
pub mod geo;
pub mod location;
pub mod notifications;
pub mod session;
pub mod sync_state;

pub use crate::geo::{rank_garages, GeoRanker, GeoRanking, RankingOptions, UserLocation};
pub use crate::notifications::{Identity, NotificationRecord, RecipientType};
pub use crate::sync_state::{NotificationSnapshot, NotificationSyncState, SyncAction};
